use std::cmp;

fn bits_helper(n: u64, i: u64) -> u64 {
    if n == 0 {
        i
    } else {
        bits_helper(n / 2, i + 1)
    }
}

/// Number of bits needed to distinguish `n` values.
pub fn bits_needed_for(n: u64) -> u64 {
    cmp::max(bits_helper(n.saturating_sub(1), 0), 1)
}

/// Number of bytes needed to hold `width` bits.
pub fn bytes_for(width: u64) -> u64 {
    width.div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits() {
        assert_eq!(bits_needed_for(0), 1);
        assert_eq!(bits_needed_for(1), 1);
        assert_eq!(bits_needed_for(2), 1);
        assert_eq!(bits_needed_for(3), 2);
        assert_eq!(bits_needed_for(4), 2);
        assert_eq!(bits_needed_for(5), 3);
        assert_eq!(bits_needed_for(1024), 10);
    }

    #[test]
    fn bytes() {
        assert_eq!(bytes_for(0), 0);
        assert_eq!(bytes_for(9), 2);
        assert_eq!(bytes_for(48), 6);
    }
}
