//! [`Serial`](crate::Serial) implementations for the built-in shapes.
//!
//! Resolution rules, in brief: primitive numerics and `bool` map to their
//! fixed-width atoms; `String` to the string atom; `[T; N]` and `Vec<T>`
//! to the array atom; `HashMap` and `BTreeMap` to the map atom when both
//! key and value are serializable; `Option<Box<T>>`, `Option<Arc<T>>` and
//! [`Leaked<T>`](crate::own::Leaked) to the reference atom under the
//! exclusive, shared and caller-managed ownership modes respectively.
//!
//! There is deliberately no impl for `i128`/`u128` (integral types wider
//! than 8 bytes are unsupported) nor for `isize`/`usize` (their width is
//! not a wire-level property).

mod list;
mod map;
mod num;
mod ptr;
mod string;

pub use list::{FixedAppender, SliceReader, VecAppender};
pub use map::{MapEntryInserter, PairReader};
