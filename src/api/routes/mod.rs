//! API Routes
//!
//! Route handlers organized by functionality.

pub mod energy;
pub mod health;
pub mod homes;
pub mod measurements;
