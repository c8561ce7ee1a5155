//!
//! Caller-facing argument classification (§4.9).
//!
//! A call site describes each parameter once with one of the builders
//! below; `Runtime::spawn` lowers the resulting list into `dtask_core`'s
//! address/size/writable records before handing it to the engine. `ignore`
//! is the only variant that contributes nothing to the scan — it exists so
//! a caller can name a parameter without the dependency engine ever seeing
//! it, e.g. a config value read once at spawn time rather than inside the
//! task body.
//!

use dtask_core::{ArgRecord, Range};

pub struct Arg(pub(crate) Option<ArgRecord>);

impl Arg {
    fn scalar<T>(addr: *const T, writable: bool) -> Arg {
        Arg(Some(ArgRecord::scalar(addr as usize, std::mem::size_of::<T>(), writable)))
    }

    /// A read-only scalar dependency.
    pub fn read<T>(value: &T) -> Arg {
        Self::scalar(value as *const T, false)
    }

    /// A read-write scalar dependency.
    pub fn write<T>(value: &mut T) -> Arg {
        Self::scalar(value as *mut T as *const T, true)
    }

    /// A read-only dependency over a raw address, for a task body that
    /// reaches the same memory through a pointer captured independently of
    /// this descriptor (the common case once a value has been handed to
    /// more than one spawned closure — see the crate-level scenarios).
    pub fn read_ptr(addr: usize, size: usize) -> Arg {
        Arg(Some(ArgRecord::scalar(addr, size, false)))
    }

    /// The write counterpart of [`Arg::read_ptr`].
    pub fn write_ptr(addr: usize, size: usize) -> Arg {
        Arg(Some(ArgRecord::scalar(addr, size, true)))
    }

    /// A value the task body captures by its own means (e.g. an owned copy,
    /// or a clone of an `Arc`) and that therefore never participates in the
    /// conflict scan.
    pub fn ignore<T>(_value: &T) -> Arg {
        Arg(None)
    }

    /// A value the task body only ever reads, but that the caller wants
    /// recorded explicitly rather than inferred — identical to `read`
    /// today; kept distinct because the base specification names it
    /// separately and a future revision may special-case it (e.g. to skip
    /// the scan entirely for values never mutated anywhere in the run).
    pub fn frozen<T>(value: &T) -> Arg {
        Self::read(value)
    }

    /// A read-only selection out of an array-like buffer.
    pub fn array_read<T>(slice: &[T], ranges: Vec<Range>) -> Arg {
        Arg(Some(ArgRecord::array(slice.as_ptr() as usize, false, ranges)))
    }

    /// A read-write selection out of an array-like buffer.
    pub fn array_write<T>(slice: &mut [T], ranges: Vec<Range>) -> Arg {
        Arg(Some(ArgRecord::array(slice.as_ptr() as usize, true, ranges)))
    }

    pub(crate) fn into_record(self) -> Option<ArgRecord> {
        self.0
    }
}

/// Lowers a caller-supplied argument list into the non-decreasing-by-address
/// form the engine's conflict scan requires, merging same-address scalars.
pub(crate) fn lower(args: Vec<Arg>) -> Vec<ArgRecord> {
    let mut sorted = Vec::with_capacity(args.len());
    for arg in args {
        if let Some(record) = arg.into_record() {
            dtask_core::arg::insert_sorted(&mut sorted, record);
        }
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_argument_contributes_no_record() {
        let x = 5i32;
        let lowered = lower(vec![Arg::ignore(&x)]);
        assert!(lowered.is_empty());
    }

    #[test]
    fn read_and_write_scalars_lower_to_distinct_records() {
        let x = 1i32;
        let mut y = 2i32;
        let lowered = lower(vec![Arg::read(&x), Arg::write(&mut y)]);
        assert_eq!(lowered.len(), 2);
        assert!(!lowered[0].writable || !lowered[1].writable || lowered.iter().any(|r| r.writable));
    }

    #[test]
    fn array_selection_lowers_with_its_ranges() {
        let mut buf = [0i32; 16];
        let lowered = lower(vec![Arg::array_write(&mut buf, vec![Range::new(0, 7)])]);
        assert_eq!(lowered.len(), 1);
        assert_eq!(lowered[0].rank(), 1);
        assert!(lowered[0].writable);
    }
}
