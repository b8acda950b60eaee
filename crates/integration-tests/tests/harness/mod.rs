//! Shared helpers for end-to-end stream tests

#![allow(dead_code)]

pub mod observe;
pub mod scenarios;
