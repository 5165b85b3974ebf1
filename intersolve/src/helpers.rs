use rand::Rng;

/// A random hex reference for provider calls that require a unique idempotency reference.
pub fn random_reference() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A random positive point-of-sale reference used to identify a voucher issue attempt. The
/// provider echoes it back, so it can be used to cancel an attempt whose response was lost.
pub fn random_ref_pos() -> i64 {
    rand::thread_rng().gen_range(1..=0xff_ffff_ffffi64)
}

/// Intersolve requires E.164-ish numbers with a leading `+`.
pub fn normalize_phone_number(phone: &str) -> String {
    if phone.starts_with('+') {
        phone.to_string()
    } else {
        format!("+{phone}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn references_are_unique_enough() {
        let a = random_reference();
        let b = random_reference();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn ref_pos_is_positive() {
        for _ in 0..100 {
            assert!(random_ref_pos() > 0);
        }
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone_number("14155238886"), "+14155238886");
        assert_eq!(normalize_phone_number("+14155238886"), "+14155238886");
    }
}
