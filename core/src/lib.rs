//! riskflow-core: risk identification, assessment, response and monitoring.
//!
//! Leaf-first:
//!   signal / risk / risk_matrix          shared data contracts
//!   risk_register                        candidate records and audit trail
//!   quantitative_assessor / qualitative_assessor
//!   response_strategy                    appetite policy → action
//!   monitoring_engine / alert            KRIs, controls, alerts
//!   coordinator                          the workflow state machine

pub mod alert;
pub mod config;
pub mod coordinator;
pub mod data_source;
pub mod error;
pub mod event;
pub mod monitoring_engine;
pub mod qualitative_assessor;
pub mod quantitative_assessor;
pub mod report;
pub mod response_strategy;
pub mod risk;
pub mod risk_matrix;
pub mod risk_register;
pub mod rng;
pub mod signal;
pub mod store;
pub mod types;
pub mod worker;
