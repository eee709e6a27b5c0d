//! Grammar for pipe-delimited delta records: `r<driver_id>c<column_index>|<code>|<value>`.

use nom::bytes::complete::{is_not, tag, take_till};
use nom::error::context;
use nom::sequence::terminated;
use nom::IResult;
use nom_supreme::error::ErrorTree;
use std::convert::TryFrom;

use crate::ids::ColumnIndex;

type Res<'a, T> = IResult<&'a str, T, ErrorTree<&'a str>>;

/// One successfully parsed delta record.
#[derive(Debug, PartialEq, Eq)]
pub struct DeltaRecord {
    pub driver_id: String,
    pub column: ColumnIndex,
    pub code: String,
    pub value: String,
}

/// Splits one line into its three pipe-separated fields. Does not validate
/// `ident` shape; that happens in [`parse_ident`]. `code` and `value` are
/// parsed with a zero-allowing `take_till`, not `is_not`: either field may
/// legitimately be empty (an empty value is a normal occurrence, e.g. a
/// cleared gap), and `is_not` errors on a zero-length match.
fn three_fields(input: &str) -> Res<(&str, &str, &str)> {
    context(
        "delta_record",
        nom::combinator::map(
            nom::sequence::tuple((
                terminated(is_not("|"), tag("|")),
                terminated(take_till(|c| c == '|'), tag("|")),
                take_till(|c| c == '\n'),
            )),
            |(ident, code, value)| (ident, code, value),
        ),
    )(input)
}

/// Splits `r<driver_id>c<column_index>` at the rightmost `c` whose suffix is
/// entirely digits. The rightmost split is deliberate: driver ids are opaque
/// and may themselves contain the letter `c`.
fn parse_ident(ident: &str) -> Option<(String, ColumnIndex)> {
    let body = ident.strip_prefix('r')?;
    let c_pos = body.rfind('c')?;
    let (driver_part, rest) = body.split_at(c_pos);
    let digits = &rest[1..];
    if driver_part.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let n: u32 = digits.parse().ok()?;
    let column = ColumnIndex::try_from(n).ok()?;
    Some((driver_part.to_string(), column))
}

/// Parses one newline-free line into a [`DeltaRecord`], or `None` if the
/// line is malformed. Malformed lines are silently skipped by the caller,
/// per the decoder's "skip, don't fail" error policy.
pub fn parse_line(line: &str) -> Option<DeltaRecord> {
    let (_, (ident, code, value)) = three_fields(line).ok()?;
    let (driver_id, column) = parse_ident(ident)?;
    Some(DeltaRecord {
        driver_id,
        column,
        code: code.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_record() {
        let rec = parse_line("r141c4|tn|57.998").unwrap();
        assert_eq!(rec.driver_id, "141");
        assert_eq!(rec.column.get(), 4);
        assert_eq!(rec.code, "tn");
        assert_eq!(rec.value, "57.998");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(parse_line("r141c4|tn").is_none());
        assert!(parse_line("r141c4|tn|57.998|extra").is_none());
    }

    #[test]
    fn rejects_missing_r_prefix() {
        assert!(parse_line("141c4|tn|57.998").is_none());
    }

    #[test]
    fn rejects_missing_c_marker() {
        assert!(parse_line("r141|tn|57.998").is_none());
    }

    #[test]
    fn rejects_out_of_range_column() {
        assert!(parse_line("r141c0|tn|1").is_none());
        assert!(parse_line("r141c15|tn|1").is_none());
    }

    #[test]
    fn driver_id_may_contain_the_letter_c() {
        let rec = parse_line("rabc123c7|tn|1").unwrap();
        assert_eq!(rec.driver_id, "abc123");
        assert_eq!(rec.column.get(), 7);
    }

    #[test]
    fn empty_value_is_well_formed() {
        let rec = parse_line("r1c1|tn|").unwrap();
        assert_eq!(rec.value, "");
    }

    #[test]
    fn empty_code_is_well_formed() {
        let rec = parse_line("r1c1||5").unwrap();
        assert_eq!(rec.code, "");
        assert_eq!(rec.value, "5");
    }

    #[test]
    fn empty_code_and_value_is_well_formed() {
        let rec = parse_line("r1c1||").unwrap();
        assert_eq!(rec.code, "");
        assert_eq!(rec.value, "");
    }
}
