use smallvec::SmallVec;

use crate::error::{Result, SourceMapError};

const VLQ_BASE_SHIFT: u32 = 5;
const VLQ_CONTINUATION_BIT: u32 = 1 << VLQ_BASE_SHIFT;
const VLQ_BASE_MASK: u32 = VLQ_CONTINUATION_BIT - 1;

/// Fields of one `mappings` segment. Valid segments carry 1, 4 or 5 fields.
pub(crate) type Segment = SmallVec<[i64; 5]>;

#[inline(always)]
fn base64_digit(c: u8) -> Option<u32> {
    match c {
        b'A'..=b'Z' => Some((c - b'A') as u32),
        b'a'..=b'z' => Some((c - b'a') as u32 + 26),
        b'0'..=b'9' => Some((c - b'0') as u32 + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Decodes a Base64 VLQ group into its signed fields.
pub(crate) fn decode_segment(segment: &str) -> Result<Segment> {
    let mut fields = Segment::new();
    let mut value: i64 = 0;
    let mut shift: u32 = 0;

    for c in segment.bytes() {
        let digit = base64_digit(c).ok_or_else(|| {
            SourceMapError::MalformedMap(format!(
                "Invalid base64 character '{}' in segment '{}'",
                c as char, segment
            ))
        })?;

        if shift > 55 {
            return Err(SourceMapError::MalformedMap(format!(
                "VLQ value overflow in segment '{}'",
                segment
            )));
        }

        value += i64::from(digit & VLQ_BASE_MASK) << shift;

        if digit & VLQ_CONTINUATION_BIT != 0 {
            shift += VLQ_BASE_SHIFT;
            continue;
        }

        let negative = value & 1 == 1;
        let magnitude = value >> 1;
        fields.push(if negative { -magnitude } else { magnitude });
        value = 0;
        shift = 0;
    }

    if shift != 0 {
        return Err(SourceMapError::MalformedMap(format!(
            "Truncated VLQ value in segment '{}'",
            segment
        )));
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("A", vec![0])]
    #[case("C", vec![1])]
    #[case("D", vec![-1])]
    #[case("AAAA", vec![0, 0, 0, 0])]
    #[case("AACA", vec![0, 0, 1, 0])]
    #[case("SAAU", vec![9, 0, 0, 10])]
    #[case("gB", vec![16])]
    #[case("hB", vec![-16])]
    #[case("AAgBC", vec![0, 0, 16, 1])]
    fn test_decode_segment(#[case] segment: &str, #[case] expected: Vec<i64>) {
        let fields = decode_segment(segment).unwrap();
        assert_eq!(fields.as_slice(), expected.as_slice());
    }

    #[rstest]
    #[case("AA*A")]
    #[case("g")]
    #[case("AAg")]
    #[case("ggggggggggggggA")]
    fn test_decode_segment_malformed(#[case] segment: &str) {
        assert!(matches!(
            decode_segment(segment),
            Err(SourceMapError::MalformedMap(_))
        ));
    }
}
