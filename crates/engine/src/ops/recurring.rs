use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, Condition, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait,
    prelude::*, sea_query::Expr,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    CreateRecurringCmd, DateWindow, EngineError, Frequency, Money, ProjectedOccurrence,
    RecurringTransaction, ResultEngine, TemplateState, Transaction, UpdateRecurringCmd,
    compute_next_due_date, project_instances, recurring,
    util::{apply_optional_text_patch, normalize_optional_text},
};

use super::{Engine, with_tx};

/// Filters for listing recurring templates. Every field narrows the result.
#[derive(Clone, Debug, Default)]
pub struct RecurringListFilter {
    /// Templates posting from or to this account.
    pub account_id: Option<Uuid>,
    pub frequency: Option<Frequency>,
    pub paused: Option<bool>,
    pub auto_post: Option<bool>,
}

/// Template counts of one user by derived state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecurringStats {
    pub total: usize,
    pub active: usize,
    pub paused: usize,
    pub exhausted: usize,
    /// Active templates whose next due date has passed.
    pub due: usize,
}

/// Projected occurrences of all of a user's templates inside one window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpcomingInstances {
    /// Sorted by due date; `running_total` accumulates across templates.
    pub occurrences: Vec<ProjectedOccurrence>,
    pub total_count: usize,
    /// Sum of the occurrence magnitudes, regardless of kind.
    pub total_amount: Money,
}

/// What a processing pass did with one due template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DueOutcome {
    /// A transaction was posted and the template advanced.
    Posted {
        transaction_id: Uuid,
        next_due_date: DateTime<Utc>,
    },
    /// `auto_post` is off; the occurrence waits and the template stays put.
    Pending,
    /// The template ran out of occurrences or passed its end date.
    Exhausted,
    Failed { error: String },
}

impl fmt::Display for DueOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posted {
                transaction_id,
                next_due_date,
            } => write!(f, "posted {transaction_id}, next due {next_due_date}"),
            Self::Pending => f.write_str("pending"),
            Self::Exhausted => f.write_str("exhausted"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

impl Engine {
    /// Stores a new template. Its first occurrence is due on `start_date`.
    pub async fn create_recurring(
        &self,
        cmd: CreateRecurringCmd,
    ) -> ResultEngine<RecurringTransaction> {
        let now = Utc::now();
        let template = RecurringTransaction {
            id: Uuid::new_v4(),
            owner_id: cmd.user_id,
            account_id: cmd.account_id,
            destination_account_id: cmd.destination_account_id,
            kind: cmd.kind,
            amount: cmd.amount,
            category_id: cmd.category_id,
            description: normalize_optional_text(cmd.description.as_deref()),
            frequency: cmd.frequency,
            interval: cmd.interval,
            frequency_data: cmd.frequency_data,
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            next_due_date: cmd.start_date,
            last_generated_date: None,
            auto_post: cmd.auto_post,
            paused: false,
            occurrences_count: 0,
            max_occurrences: cmd.max_occurrences,
            created_at: now,
            updated_at: now,
        };
        template.validate()?;

        with_tx!(self, "create_recurring", |db_tx| {
            self.check_template_refs(&db_tx, &template).await?;
            recurring::ActiveModel::try_from(&template)?
                .insert(&db_tx)
                .await?;
            Ok(template)
        })
    }

    async fn check_template_refs(
        &self,
        db_tx: &DatabaseTransaction,
        template: &RecurringTransaction,
    ) -> ResultEngine<()> {
        let (source, _) = self
            .resolve_posting_accounts(
                db_tx,
                &template.owner_id,
                template.account_id,
                template.destination_account_id,
            )
            .await?;
        source.currency.ensure_precision(template.amount)?;
        self.ensure_category_owned(db_tx, &template.owner_id, template.category_id)
            .await
    }

    pub async fn recurring(
        &self,
        recurring_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<RecurringTransaction> {
        with_tx!(self, "recurring", |db_tx| {
            let model = self
                .require_recurring(&db_tx, user_id, recurring_id)
                .await?;
            RecurringTransaction::try_from(model)
        })
    }

    /// Templates of `user_id` ordered by next due date.
    pub async fn list_recurring(
        &self,
        user_id: &str,
        filter: &RecurringListFilter,
    ) -> ResultEngine<Vec<RecurringTransaction>> {
        with_tx!(self, "list_recurring", |db_tx| {
            let mut query = recurring::Entity::find()
                .filter(recurring::Column::OwnerId.eq(user_id.to_string()))
                .filter(recurring::Column::DeletedAt.is_null());
            if let Some(account_id) = filter.account_id {
                let account_id = account_id.to_string();
                query = query.filter(
                    Condition::any()
                        .add(recurring::Column::AccountId.eq(account_id.clone()))
                        .add(recurring::Column::DestinationAccountId.eq(account_id)),
                );
            }
            if let Some(frequency) = filter.frequency {
                query = query.filter(recurring::Column::Frequency.eq(frequency.as_str()));
            }
            if let Some(paused) = filter.paused {
                query = query.filter(recurring::Column::Paused.eq(paused));
            }
            if let Some(auto_post) = filter.auto_post {
                query = query.filter(recurring::Column::AutoPost.eq(auto_post));
            }

            let models = query
                .order_by_asc(recurring::Column::NextDueDate)
                .order_by_asc(recurring::Column::Id)
                .all(&db_tx)
                .await?;
            models
                .into_iter()
                .map(RecurringTransaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Patches a template.
    ///
    /// Changing the schedule of a template that never generated moves its
    /// next due date to the (new) start date; otherwise the next due date is
    /// recomputed from the last generated occurrence.
    pub async fn update_recurring(
        &self,
        cmd: UpdateRecurringCmd,
    ) -> ResultEngine<RecurringTransaction> {
        with_tx!(self, "update_recurring", |db_tx| {
            let model = self
                .require_recurring(&db_tx, &cmd.user_id, cmd.recurring_id)
                .await?;
            let mut template = RecurringTransaction::try_from(model)?;

            if let Some(amount) = cmd.amount {
                template.amount = amount;
            }
            if let Some(frequency) = cmd.frequency {
                template.frequency = frequency;
            }
            if let Some(interval) = cmd.interval {
                template.interval = interval;
            }
            if let Some(data) = cmd.frequency_data.clone() {
                template.frequency_data = Some(data);
            }
            if let Some(start_date) = cmd.start_date {
                template.start_date = start_date;
            }
            if let Some(end_date) = cmd.end_date {
                template.end_date = Some(end_date);
            }
            if let Some(category_id) = cmd.category_id {
                template.category_id = Some(category_id);
            }
            template.description =
                apply_optional_text_patch(template.description, cmd.description.as_deref());
            if let Some(auto_post) = cmd.auto_post {
                template.auto_post = auto_post;
            }
            if let Some(max) = cmd.max_occurrences {
                template.max_occurrences = Some(max);
            }

            if cmd.reschedules() {
                template.next_due_date = match template.last_generated_date {
                    None => template.start_date,
                    Some(_) => compute_next_due_date(&template)?,
                };
            }
            template.validate()?;
            self.check_template_refs(&db_tx, &template).await?;
            template.updated_at = Utc::now();

            recurring::ActiveModel::try_from(&template)?
                .update(&db_tx)
                .await?;
            Ok(template)
        })
    }

    pub async fn delete_recurring(&self, recurring_id: Uuid, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, "delete_recurring", |db_tx| {
            let model = self
                .require_recurring(&db_tx, user_id, recurring_id)
                .await?;
            let now = Utc::now();
            let mut active: recurring::ActiveModel = model.into();
            active.deleted_at = sea_orm::ActiveValue::Set(Some(now));
            active.updated_at = sea_orm::ActiveValue::Set(now);
            active.update(&db_tx).await?;
            Ok(())
        })
    }

    /// Pauses or resumes a template. Resuming an exhausted template has no
    /// effect on its state.
    pub async fn pause_recurring(
        &self,
        recurring_id: Uuid,
        user_id: &str,
        paused: bool,
    ) -> ResultEngine<RecurringTransaction> {
        with_tx!(self, "pause_recurring", |db_tx| {
            let model = self
                .require_recurring(&db_tx, user_id, recurring_id)
                .await?;
            let mut template = RecurringTransaction::try_from(model)?;
            template.paused = paused;
            template.updated_at = Utc::now();
            recurring::ActiveModel::try_from(&template)?
                .update(&db_tx)
                .await?;
            Ok(template)
        })
    }

    pub async fn recurring_stats(&self, user_id: &str) -> ResultEngine<RecurringStats> {
        let now = Utc::now();
        let templates = self
            .list_recurring(user_id, &RecurringListFilter::default())
            .await?;

        let mut stats = RecurringStats {
            total: templates.len(),
            ..RecurringStats::default()
        };
        for template in &templates {
            match template.state() {
                TemplateState::Active => stats.active += 1,
                TemplateState::Paused => stats.paused += 1,
                TemplateState::Exhausted => stats.exhausted += 1,
            }
            if template.is_due(now) {
                stats.due += 1;
            }
        }
        Ok(stats)
    }

    /// Active templates of every user whose next due date is at or before
    /// `now`, oldest first.
    pub async fn due_recurring(
        &self,
        now: DateTime<Utc>,
    ) -> ResultEngine<Vec<RecurringTransaction>> {
        let candidates = self.unpaused_past_due(now).await?;
        Ok(candidates
            .into_iter()
            .filter(|template| template.is_due(now))
            .collect())
    }

    /// Unpaused templates past their due date, exhausted ones included.
    async fn unpaused_past_due(
        &self,
        now: DateTime<Utc>,
    ) -> ResultEngine<Vec<RecurringTransaction>> {
        with_tx!(self, "due_recurring", |db_tx| {
            let models = recurring::Entity::find()
                .filter(recurring::Column::DeletedAt.is_null())
                .filter(recurring::Column::Paused.eq(false))
                .filter(recurring::Column::NextDueDate.lte(now))
                .order_by_asc(recurring::Column::NextDueDate)
                .order_by_asc(recurring::Column::Id)
                .all(&db_tx)
                .await?;
            models
                .into_iter()
                .map(RecurringTransaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Projects every active template of `user_id` into `window`, merged
    /// and sorted by due date.
    pub async fn upcoming_instances(
        &self,
        user_id: &str,
        window: &DateWindow,
    ) -> ResultEngine<UpcomingInstances> {
        let templates = self
            .list_recurring(user_id, &RecurringListFilter::default())
            .await?;

        let mut occurrences: Vec<ProjectedOccurrence> = Vec::new();
        for template in &templates {
            occurrences.extend(project_instances(template, window)?.occurrences);
        }
        occurrences.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then_with(|| a.recurring_id.cmp(&b.recurring_id))
        });

        let mut total_amount = Money::ZERO;
        for occurrence in &mut occurrences {
            total_amount = total_amount.checked_add(occurrence.amount).ok_or_else(|| {
                EngineError::InvalidAmount("projected total is out of range".to_string())
            })?;
            occurrence.running_total = total_amount;
        }
        Ok(UpcomingInstances {
            total_count: occurrences.len(),
            occurrences,
            total_amount,
        })
    }

    /// Materializes one occurrence of every due template.
    ///
    /// Each template is handled in its own DB transaction: a failure is
    /// logged, reported as [`DueOutcome::Failed`] and does not stop the pass.
    /// A template several periods behind catches up one occurrence per pass.
    pub async fn process_due(&self, now: DateTime<Utc>) -> ResultEngine<Vec<(Uuid, DueOutcome)>> {
        let templates = self.unpaused_past_due(now).await?;
        let mut outcomes = Vec::with_capacity(templates.len());

        for template in templates {
            let outcome = if template.is_exhausted() {
                DueOutcome::Exhausted
            } else if !template.auto_post {
                tracing::debug!(recurring_id = %template.id, "occurrence left pending");
                DueOutcome::Pending
            } else {
                match self.post_occurrence(&template, now).await {
                    Ok((transaction_id, next_due_date)) => {
                        tracing::info!(
                            recurring_id = %template.id,
                            %transaction_id,
                            %next_due_date,
                            "posted recurring occurrence"
                        );
                        DueOutcome::Posted {
                            transaction_id,
                            next_due_date,
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            recurring_id = %template.id,
                            error = %err,
                            "failed to post recurring occurrence"
                        );
                        DueOutcome::Failed {
                            error: err.to_string(),
                        }
                    }
                }
            };
            outcomes.push((template.id, outcome));
        }
        Ok(outcomes)
    }

    /// Posts the template's current occurrence and advances it, atomically.
    ///
    /// The advance only lands if no other pass consumed the occurrence first.
    async fn post_occurrence(
        &self,
        template: &RecurringTransaction,
        now: DateTime<Utc>,
    ) -> ResultEngine<(Uuid, DateTime<Utc>)> {
        with_tx!(self, "process_due", |db_tx| {
            let model = self
                .require_recurring(&db_tx, &template.owner_id, template.id)
                .await?;
            let template = RecurringTransaction::try_from(model)?;
            if !template.is_due(now) {
                return Err(EngineError::Validation(
                    "recurring transaction is no longer due".to_string(),
                ));
            }

            let (source, destination) = self
                .resolve_posting_accounts(
                    &db_tx,
                    &template.owner_id,
                    template.account_id,
                    template.destination_account_id,
                )
                .await?;
            let category_id = match template.category_id {
                Some(category_id) => self
                    .find_category(&db_tx, &template.owner_id, category_id)
                    .await?
                    .map(|_| category_id),
                None => None,
            };

            let due_date = template.next_due_date;
            let posted_at = Utc::now();
            let mut tx = Transaction::new(
                template.kind,
                source.id,
                destination.map(|account| account.id),
                template.amount,
                source.currency,
                due_date,
                template.owner_id.clone(),
                posted_at,
            )?;
            tx.category_id = category_id;
            tx.description = template.description.clone();
            tx.recurring_id = Some(template.id);
            self.insert_with_balances(&db_tx, &template.owner_id, &tx)
                .await?;

            let next_due_date = template.next_occurrence_after(due_date).ok_or_else(|| {
                EngineError::Validation("next due date is out of range".to_string())
            })?;
            let count = i64::from(template.occurrences_count);
            let result = recurring::Entity::update_many()
                .col_expr(recurring::Column::NextDueDate, Expr::value(next_due_date))
                .col_expr(
                    recurring::Column::LastGeneratedDate,
                    Expr::value(Some(due_date)),
                )
                .col_expr(recurring::Column::OccurrencesCount, Expr::value(count + 1))
                .col_expr(recurring::Column::UpdatedAt, Expr::value(posted_at))
                .filter(recurring::Column::Id.eq(template.id.to_string()))
                .filter(recurring::Column::OccurrencesCount.eq(count))
                .exec(&db_tx)
                .await?;
            if result.rows_affected != 1 {
                return Err(EngineError::ConcurrentUpdate(format!(
                    "recurring transaction {} was processed concurrently",
                    template.id
                )));
            }
            Ok((tx.id, next_due_date))
        })
    }
}
