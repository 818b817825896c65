//! Rendering of panic payloads captured with `catch_unwind`.

use std::any::Any;

/// Extract a human-readable message from a panic payload.
///
/// `panic!` with a literal produces a `&'static str` payload and a formatted
/// `panic!` produces a `String`; anything else is reported generically.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_static_str_payload() {
        let payload = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }

    #[test]
    fn test_formatted_payload() {
        let code = 7;
        let payload = catch_unwind(AssertUnwindSafe(|| panic!("failed with {code}"))).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "failed with 7");
    }

    #[test]
    fn test_opaque_payload() {
        let payload = catch_unwind(|| std::panic::panic_any(42_u32)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
