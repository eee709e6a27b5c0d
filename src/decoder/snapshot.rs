//! Grammar for the `grid||`-carried HTML grid: header row extraction and
//! positional data-row cell extraction.
//!
//! This is not a general HTML parser. The feed's markup is a fixed, narrow
//! shape (`<tbody>` of `<tr data-id="...">` of `<td>` cells, never nested),
//! so a handful of `nom` combinators scanning for literal tag boundaries is
//! both sufficient and considerably cheaper than pulling in a DOM crate for
//! one table.

use nom::bytes::complete::{tag, take_until};
use nom::sequence::delimited;
use nom::IResult;

type Res<'a, T> = IResult<&'a str, T>;

/// One `<tr ...>...</tr>` block: its opening tag's attributes and its inner HTML.
fn tr_block(input: &str) -> Res<(&str, &str)> {
    let (input, _) = take_until("<tr")(input)?;
    let (input, open_tag) = delimited(tag("<tr"), take_until(">"), tag(">"))(input)?;
    let (input, inner) = take_until("</tr>")(input)?;
    let (input, _) = tag("</tr>")(input)?;
    Ok((input, (open_tag, inner)))
}

/// One `<td ...>...</td>` block.
fn td_block(input: &str) -> Res<(&str, &str)> {
    let (input, _) = take_until("<td")(input)?;
    let (input, open_tag) = delimited(tag("<td"), take_until(">"), tag(">"))(input)?;
    let (input, inner) = take_until("</td>")(input)?;
    let (input, _) = tag("</td>")(input)?;
    Ok((input, (open_tag, inner)))
}

fn all<'a>(
    mut parser: impl FnMut(&'a str) -> Res<'a, (&'a str, &'a str)>,
    mut input: &'a str,
) -> Vec<(&'a str, &'a str)> {
    let mut out = Vec::new();
    while let Ok((rest, item)) = parser(input) {
        out.push(item);
        input = rest;
    }
    out
}

fn attr<'a>(tag_attrs: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{}=\"", name);
    let start = tag_attrs.find(needle.as_str())? + needle.len();
    let rest = &tag_attrs[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

/// A single logical row found in the `<tbody>`: the raw `data-id="r..."`
/// value (without the `r` prefix) and the row's `<td>` cells.
pub struct Row<'a> {
    pub row_id: &'a str,
    pub cells: Vec<Cell<'a>>,
}

pub struct Cell<'a> {
    /// `data-id="c<n>"` attribute, if present on this `<td>`.
    pub explicit_index: Option<u32>,
    pub text: &'a str,
}

/// Extracts every `<tr data-id="r...">` row from a `grid||`-prefixed frame,
/// in document order. Rows without a `data-id` attribute are skipped: the
/// feed never emits one, and it carries no driver/header identity.
pub fn rows(frame: &str) -> Vec<Row<'_>> {
    let body_start = match frame.find("<tbody") {
        Some(i) => i,
        None => return Vec::new(),
    };
    let body = &frame[body_start..];

    all(tr_block, body)
        .into_iter()
        .filter_map(|(open_tag, inner)| {
            let row_id = attr(open_tag, "data-id")?.strip_prefix('r')?;
            let cells = all(td_block, inner)
                .into_iter()
                .map(|(td_tag, text)| Cell {
                    explicit_index: attr(td_tag, "data-id")
                        .and_then(|v| v.strip_prefix('c'))
                        .and_then(|v| v.parse().ok()),
                    text: text.trim(),
                })
                .collect();
            Some(Row { row_id, cells })
        })
        .collect()
}
