//! Book outline services.
//!
//! # Responsibility
//! - Turn repository rows into nested trees and rendered outlines.
//! - Own every structural mutation of a book outline.

pub mod outline_service;
pub mod outline_view;
pub mod tree_builder;
