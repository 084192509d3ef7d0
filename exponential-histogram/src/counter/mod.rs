//! Bucket-count storage: a byte-width-promoting flat array
//! ([`multi_type::MultiTypeCounterArray`]), and the windowed ring buffer
//! built on top of it ([`windowed::WindowedCounterArray`]).

mod multi_type;
mod windowed;

pub use multi_type::MultiTypeCounterArray;
pub use windowed::WindowedCounterArray;
