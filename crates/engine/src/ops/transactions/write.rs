mod common;
mod create;
mod delete;
mod detail;
mod transfer;
mod update;
