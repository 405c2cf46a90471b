use chrono::Utc;
use sea_orm::{ActiveModelTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    ActionType, CreateRuleCmd, RULE_MATCH_POLICY, ResultEngine, RuleAction, RuleMatch,
    Transaction, TransactionRule, TransactionSnapshot, UpdateRuleCmd, UpdateTransactionCmd,
    accounts, categories, evaluate_rules, rules,
    util::normalize_required_name,
};

use super::{Engine, with_tx};

impl Engine {
    /// Stores a new categorization rule after checking that every condition
    /// and action can be decoded.
    pub async fn create_rule(&self, cmd: CreateRuleCmd) -> ResultEngine<TransactionRule> {
        let now = Utc::now();
        let rule = TransactionRule {
            id: Uuid::new_v4(),
            owner_id: cmd.user_id,
            name: normalize_required_name(&cmd.name, "rule")?,
            active: cmd.active,
            priority: cmd.priority,
            conditions: cmd.conditions,
            actions: cmd.actions,
            created_at: now,
            updated_at: now,
        };
        rule.validate()?;

        with_tx!(self, "create_rule", |db_tx| {
            rules::ActiveModel::try_from(&rule)?.insert(&db_tx).await?;
            Ok(rule)
        })
    }

    pub async fn rule(&self, rule_id: Uuid, user_id: &str) -> ResultEngine<TransactionRule> {
        with_tx!(self, "rule", |db_tx| {
            let model = self.require_rule(&db_tx, user_id, rule_id).await?;
            TransactionRule::try_from(model)
        })
    }

    /// Rules of `user_id` in evaluation order: highest priority first, ties
    /// by creation time.
    pub async fn list_rules(&self, user_id: &str) -> ResultEngine<Vec<TransactionRule>> {
        self.load_rules(user_id, false).await
    }

    /// Like [`Engine::list_rules`], restricted to active rules.
    pub async fn list_active_rules(&self, user_id: &str) -> ResultEngine<Vec<TransactionRule>> {
        self.load_rules(user_id, true).await
    }

    async fn load_rules(
        &self,
        user_id: &str,
        active_only: bool,
    ) -> ResultEngine<Vec<TransactionRule>> {
        with_tx!(self, "list_rules", |db_tx| {
            let mut query = rules::Entity::find()
                .filter(rules::Column::OwnerId.eq(user_id.to_string()))
                .filter(rules::Column::DeletedAt.is_null());
            if active_only {
                query = query.filter(rules::Column::Active.eq(true));
            }
            let models = query
                .order_by_desc(rules::Column::Priority)
                .order_by_asc(rules::Column::CreatedAt)
                .order_by_asc(rules::Column::Id)
                .all(&db_tx)
                .await?;
            models
                .into_iter()
                .map(TransactionRule::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    pub async fn update_rule(&self, cmd: UpdateRuleCmd) -> ResultEngine<TransactionRule> {
        let name = cmd
            .name
            .as_deref()
            .map(|name| normalize_required_name(name, "rule"))
            .transpose()?;

        with_tx!(self, "update_rule", |db_tx| {
            let model = self
                .require_rule(&db_tx, &cmd.user_id, cmd.rule_id)
                .await?;
            let mut rule = TransactionRule::try_from(model)?;
            if let Some(name) = name {
                rule.name = name;
            }
            if let Some(active) = cmd.active {
                rule.active = active;
            }
            if let Some(priority) = cmd.priority {
                rule.priority = priority;
            }
            if let Some(conditions) = cmd.conditions.clone() {
                rule.conditions = conditions;
            }
            if let Some(actions) = cmd.actions.clone() {
                rule.actions = actions;
            }
            rule.validate()?;
            rule.updated_at = Utc::now();

            rules::ActiveModel::try_from(&rule)?.update(&db_tx).await?;
            Ok(rule)
        })
    }

    pub async fn delete_rule(&self, rule_id: Uuid, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, "delete_rule", |db_tx| {
            let model = self.require_rule(&db_tx, user_id, rule_id).await?;
            let mut active: rules::ActiveModel = model.into();
            active.deleted_at = sea_orm::ActiveValue::Set(Some(Utc::now()));
            active.update(&db_tx).await?;
            Ok(())
        })
    }

    /// Flips the `active` flag and returns the updated rule.
    pub async fn toggle_rule(&self, rule_id: Uuid, user_id: &str) -> ResultEngine<TransactionRule> {
        with_tx!(self, "toggle_rule", |db_tx| {
            let model = self.require_rule(&db_tx, user_id, rule_id).await?;
            let mut rule = TransactionRule::try_from(model)?;
            rule.active = !rule.active;
            rule.updated_at = Utc::now();
            rules::ActiveModel::try_from(&rule)?.update(&db_tx).await?;
            Ok(rule)
        })
    }

    /// Builds the read-only view the evaluator works on, with the account
    /// and category names resolved.
    pub async fn transaction_snapshot(
        &self,
        transaction_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<TransactionSnapshot> {
        with_tx!(self, "transaction_snapshot", |db_tx| {
            let model = self
                .require_transaction(&db_tx, user_id, transaction_id)
                .await?;
            let tx = Transaction::try_from(model)?;

            let account_name = accounts::Entity::find_by_id(tx.account_id.to_string())
                .one(&db_tx)
                .await?
                .map(|account| account.name)
                .unwrap_or_default();
            let category_name = match tx.category_id {
                Some(category_id) => categories::Entity::find_by_id(category_id.to_string())
                    .one(&db_tx)
                    .await?
                    .map(|category| category.name),
                None => None,
            };
            Ok(TransactionSnapshot::from_transaction(
                &tx,
                account_name,
                category_name,
            ))
        })
    }

    /// Folds `actions` into a single update of the transaction.
    ///
    /// Later actions of the same type overwrite earlier ones. Values of the
    /// wrong shape are skipped. Returns `None` when nothing was changed.
    pub async fn apply_rule_actions(
        &self,
        transaction_id: Uuid,
        user_id: &str,
        actions: &[RuleAction],
    ) -> ResultEngine<Option<Transaction>> {
        let mut cmd = UpdateTransactionCmd::new(transaction_id, user_id);
        for action in actions {
            match (action.kind, action.value.as_text()) {
                (ActionType::SetCategory, Some(raw)) => match Uuid::parse_str(raw) {
                    Ok(category_id) => cmd = cmd.category_id(category_id),
                    Err(_) => tracing::warn!(
                        %transaction_id,
                        value = raw,
                        "set_category value is not a category id"
                    ),
                },
                (ActionType::SetDescription, Some(description)) => {
                    cmd = cmd.description(description);
                }
                (ActionType::SetNote, Some(note)) => cmd = cmd.note(note),
                (ActionType::SetTags, _) => {
                    tracing::debug!(%transaction_id, "set_tags is not applied by rules");
                }
                (kind, None) => tracing::warn!(
                    %transaction_id,
                    action = kind.as_str(),
                    value_type = action.value.type_name(),
                    "skipping rule action with a non-string value"
                ),
            }
        }

        if !cmd.has_changes() {
            return Ok(None);
        }
        self.update_transaction(cmd).await.map(Some)
    }

    /// Evaluates the user's active rules against a transaction and applies
    /// the actions of the matches selected by [`RULE_MATCH_POLICY`].
    ///
    /// Every match is returned; an action failure is reported on its match
    /// instead of aborting the others.
    pub async fn apply_rules_to_transaction(
        &self,
        transaction_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<Vec<RuleMatch>> {
        let snapshot = self.transaction_snapshot(transaction_id, user_id).await?;
        let rules = self.list_active_rules(user_id).await?;
        let mut matches = evaluate_rules(&rules, &snapshot);

        let selected = RULE_MATCH_POLICY.select(&matches).len();
        for rule_match in matches.iter_mut().take(selected) {
            match self
                .apply_rule_actions(transaction_id, user_id, &rule_match.actions)
                .await
            {
                Ok(_) => tracing::info!(
                    %transaction_id,
                    rule_id = %rule_match.rule_id,
                    rule = rule_match.rule_name.as_str(),
                    "applied rule"
                ),
                Err(err) => {
                    tracing::warn!(
                        %transaction_id,
                        rule_id = %rule_match.rule_id,
                        error = %err,
                        "failed to apply rule actions"
                    );
                    rule_match.error = Some(err.to_string());
                }
            }
        }
        Ok(matches)
    }
}
