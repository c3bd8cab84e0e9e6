// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Types that may be placed in shared memory and how they are described to
// other processes.

use crate::service::static_config::{TypeDetail, TypeVariant};

/// Marks a type that can be sent between processes by sharing its bytes.
///
/// # Safety
///
/// The type must be self-contained: no pointers, references or handles that
/// are only meaningful inside one process, and a stable layout (`#[repr(C)]`
/// for user structs). Both sides must agree on the layout behind
/// [`type_name`](ZeroCopySend::type_name).
pub unsafe trait ZeroCopySend {
    /// Name compared with the other side when a service is opened.
    ///
    /// Defaults to the Rust type path. Override it to interoperate with
    /// processes that describe the same layout under another name. An empty
    /// name is never compatible with anything.
    fn type_name() -> &'static str {
        core::any::type_name::<Self>()
    }
}

macro_rules! zero_copy_send {
    ($($t:ty),* $(,)?) => {
        $(unsafe impl ZeroCopySend for $t {})*
    };
}

zero_copy_send!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
);

unsafe impl<T: ZeroCopySend, const N: usize> ZeroCopySend for [T; N] {}

/// Payload shapes a port can carry: a single `T` or a slice `[T]`.
pub trait PayloadType {
    /// Element stored in shared memory.
    type Element: ZeroCopySend;

    fn type_detail() -> TypeDetail;

    /// # Safety
    /// `ptr` must point to `len` initialised, properly aligned elements that
    /// stay valid for `'a`.
    unsafe fn from_raw<'a>(ptr: *const u8, len: usize) -> &'a Self;

    /// # Safety
    /// Same as [`from_raw`](PayloadType::from_raw), plus exclusive access.
    unsafe fn from_raw_mut<'a>(ptr: *mut u8, len: usize) -> &'a mut Self;
}

impl<T: ZeroCopySend> PayloadType for T {
    type Element = T;

    fn type_detail() -> TypeDetail {
        TypeDetail::new::<T>(TypeVariant::FixedSize)
    }

    unsafe fn from_raw<'a>(ptr: *const u8, _len: usize) -> &'a Self {
        &*(ptr as *const T)
    }

    unsafe fn from_raw_mut<'a>(ptr: *mut u8, _len: usize) -> &'a mut Self {
        &mut *(ptr as *mut T)
    }
}

impl<T: ZeroCopySend> PayloadType for [T] {
    type Element = T;

    fn type_detail() -> TypeDetail {
        TypeDetail::new::<T>(TypeVariant::Dynamic)
    }

    unsafe fn from_raw<'a>(ptr: *const u8, len: usize) -> &'a Self {
        std::slice::from_raw_parts(ptr as *const T, len)
    }

    unsafe fn from_raw_mut<'a>(ptr: *mut u8, len: usize) -> &'a mut Self {
        std::slice::from_raw_parts_mut(ptr as *mut T, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Renamed {
        _x: u32,
    }

    unsafe impl ZeroCopySend for Renamed {
        fn type_name() -> &'static str {
            "Renamed"
        }
    }

    #[test]
    fn fixed_and_slice_details_differ_only_in_variant() {
        let fixed = <u64 as PayloadType>::type_detail();
        let slice = <[u64] as PayloadType>::type_detail();
        assert_eq!(fixed.variant(), TypeVariant::FixedSize);
        assert_eq!(slice.variant(), TypeVariant::Dynamic);
        assert_eq!(fixed.type_name(), slice.type_name());
        assert_eq!(fixed.size(), 8);
        assert_eq!(slice.alignment(), std::mem::align_of::<u64>());
    }

    #[test]
    fn overridden_name_is_used() {
        assert_eq!(<Renamed as PayloadType>::type_detail().type_name(), "Renamed");
        assert_eq!(<u8 as PayloadType>::type_detail().type_name(), "u8");
    }
}
