// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod calendar;
pub mod trip;

pub use calendar::{CalendarCredential, CalendarEventProjection, EventTime};
pub use trip::{NewTrip, Trip};
