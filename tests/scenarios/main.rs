//! Scenario-based tests for mlops-pipeline

mod helpers;

mod failure_handling;
mod poll_behavior;
mod success_chain;
mod trigger_dispatch;
