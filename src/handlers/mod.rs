//! HTTP handlers.

pub mod activities;
pub mod agenda;
pub mod auth;
pub mod codes;
pub mod consultations;
pub mod diary;
pub mod health;
pub mod link;
pub mod patients;
