//! Data Length Code mapping
//!
//! Classic CAN uses DLC 0-8 as a plain byte count. CAN-FD keeps that for
//! 0-8 and maps the codes 9-15 onto the larger payload sizes.

use crate::error::FrameValidationError;

/// Maximum payload of a classic CAN frame
pub const CLASSIC_MAX_LEN: usize = 8;

/// Maximum payload of a CAN-FD frame
pub const FD_MAX_LEN: usize = 64;

/// Every payload length a CAN-FD frame may carry, indexed by DLC
pub const FD_LENGTHS: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Convert a DLC code to its payload length
pub fn dlc_to_len(dlc: u8) -> Result<usize, FrameValidationError> {
    FD_LENGTHS
        .get(dlc as usize)
        .copied()
        .ok_or(FrameValidationError::InvalidDlc(dlc))
}

/// Convert a payload length to its DLC code
///
/// Only exact table entries map; a length between two FD sizes returns `None`
/// rather than rounding up, since rounding would imply padding the payload.
pub fn len_to_dlc(len: usize) -> Option<u8> {
    FD_LENGTHS.iter().position(|&l| l == len).map(|dlc| dlc as u8)
}

/// Check whether `len` is a legal payload length
pub fn is_valid_len(len: usize, fd: bool) -> bool {
    if fd {
        len_to_dlc(len).is_some()
    } else {
        len <= CLASSIC_MAX_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classic_lengths() {
        for len in 0..=8 {
            assert!(is_valid_len(len, false));
        }
        assert!(!is_valid_len(9, false));
        assert!(!is_valid_len(12, false));
    }

    #[test]
    fn test_fd_lengths() {
        assert!(is_valid_len(12, true));
        assert!(is_valid_len(64, true));
        assert!(!is_valid_len(9, true));
        assert!(!is_valid_len(13, true));
        assert!(!is_valid_len(65, true));
    }

    #[test]
    fn test_dlc_table() {
        assert_eq!(dlc_to_len(8), Ok(8));
        assert_eq!(dlc_to_len(9), Ok(12));
        assert_eq!(dlc_to_len(13), Ok(32));
        assert_eq!(dlc_to_len(15), Ok(64));
        assert_eq!(dlc_to_len(16), Err(FrameValidationError::InvalidDlc(16)));

        assert_eq!(len_to_dlc(48), Some(14));
        assert_eq!(len_to_dlc(20), Some(11));
        assert_eq!(len_to_dlc(10), None);
    }

    proptest! {
        #[test]
        fn dlc_codes_map_back(dlc in 0u8..16) {
            let len = dlc_to_len(dlc).unwrap();
            prop_assert_eq!(len_to_dlc(len), Some(dlc));
            prop_assert!(is_valid_len(len, true));
        }

        #[test]
        fn lengths_between_fd_sizes_are_rejected(len in 9usize..=64) {
            prop_assert_eq!(is_valid_len(len, true), FD_LENGTHS.contains(&len));
        }
    }
}
