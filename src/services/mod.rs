// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod google_calendar;
pub mod identity;
pub mod kms;
pub mod oauth_state;

pub use google_calendar::{GoogleCalendarService, GoogleClient};
pub use identity::{IdentityError, IdentityVerifier, VerifiedIdentity};
pub use kms::KmsService;
