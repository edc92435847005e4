// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized validation tolerances.
//!
//! The pack/unpack path is pure data movement plus at most one addition
//! (the periodic shift), so most checks in this crate compare exactly.
//! The constants below cover the few places where arithmetic accumulates.

/// Tolerance for operations that should be exact in f64 arithmetic.
///
/// Ghost position copies and single-shift packs are bit-preserving or a
/// single IEEE 754 addition; 1e-12 allows for nothing beyond that.
pub const EXACT_F64: f64 = 1e-12;

/// Tolerance for force folds that accumulate several ghost contributions.
///
/// A corner particle on a fully periodic-intra grid receives up to seven
/// image contributions; 1e-10 allows the associated rounding.
pub const ACCUMULATED_F64: f64 = 1e-10;
