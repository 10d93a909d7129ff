//! Mesa - Guided Technical-Support Conversation Engine
//!
//! This crate implements an AI-governed conversation state machine that
//! walks an end user through consent, identification, problem description,
//! and step-by-step diagnosis, escalating to a human technician when the
//! automated flow runs out of road.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
