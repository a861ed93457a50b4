//! Columnar output for the listing commands.
//!
//! Rows are collected first and measured in one pass at render time, so a
//! listing never reflows. Columns may cap their width; over-long values
//! (site URLs, checksums) are clipped with an ellipsis rather than blowing
//! out the layout.

use std::fmt::Write as _;
use std::io::{self, ErrorKind, Write};

use ansi_term::Style;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const SEPARATOR: &str = "  ";
const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Align {
    Left,
    Right,
}

/// Static description of one column
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    heading: &'static str,
    align: Align,
    /// Widest the column may grow; longer values are clipped
    limit: Option<usize>,
}

impl ColumnSpec {
    pub fn left(heading: &'static str) -> Self {
        Self {
            heading,
            align: Align::Left,
            limit: None,
        }
    }

    pub fn right(heading: &'static str) -> Self {
        Self {
            heading,
            align: Align::Right,
            limit: None,
        }
    }

    pub fn capped(heading: &'static str, limit: usize) -> Self {
        Self {
            heading,
            align: Align::Left,
            limit: Some(limit),
        }
    }
}

/// One value in a row, optionally styled when styling is on
#[derive(Debug)]
pub struct Cell {
    text: String,
    style: Option<Style>,
}

impl Cell {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: None,
        }
    }

    pub fn styled(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style: Some(style),
        }
    }
}

pub struct Table {
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<Cell>>,
    header: bool,
    styled: bool,
}

impl Table {
    pub fn new(columns: Vec<ColumnSpec>, header: bool, styled: bool) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            header,
            styled,
        }
    }

    /// Appends a row. Missing trailing cells render blank; extras are
    /// dropped.
    pub fn row(&mut self, mut cells: Vec<Cell>) {
        cells.truncate(self.columns.len());
        while cells.len() < self.columns.len() {
            cells.push(Cell::plain(""));
        }
        self.rows.push(cells);
    }

    /// Renders to stdout. A broken pipe ends the listing silently.
    pub fn print(&self) -> io::Result<()> {
        match self.render(&mut io::stdout().lock()) {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    }

    pub fn render(&self, out: &mut impl Write) -> io::Result<()> {
        let widths = self.measure();

        if self.header {
            let underline = Style::new().underline();
            let mut line = String::new();
            for (i, column) in self.columns.iter().enumerate() {
                if i > 0 {
                    line.push_str(SEPARATOR);
                }
                let padded = pad(column.heading, widths[i], Align::Left, i + 1 == widths.len());
                if self.styled {
                    let _ = write!(line, "{}", underline.paint(padded));
                } else {
                    line.push_str(&padded);
                }
            }
            writeln!(out, "{}", line.trim_end())?;
        }

        for row in &self.rows {
            let mut line = String::new();
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    line.push_str(SEPARATOR);
                }
                let clipped = clip(&cell.text, self.columns[i].limit);
                let padded = pad(
                    &clipped,
                    widths[i],
                    self.columns[i].align,
                    i + 1 == widths.len(),
                );
                match cell.style.filter(|_| self.styled) {
                    Some(style) => {
                        let _ = write!(line, "{}", style.paint(padded));
                    }
                    None => line.push_str(&padded),
                }
            }
            writeln!(out, "{}", line.trim_end())?;
        }

        Ok(())
    }

    /// Final width of every column: the widest clipped value, plus the
    /// heading when one is shown
    fn measure(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self
            .columns
            .iter()
            .map(|c| {
                if self.header {
                    UnicodeWidthStr::width(c.heading)
                } else {
                    0
                }
            })
            .collect();

        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let width = UnicodeWidthStr::width(clip(&cell.text, self.columns[i].limit).as_ref());
                if width > widths[i] {
                    widths[i] = width;
                }
            }
        }

        widths
    }
}

/// Pads a value to the column width. The last column stays ragged unless
/// it is right-aligned, so lines carry no trailing spaces.
fn pad(text: &str, width: usize, align: Align, last: bool) -> String {
    let current = UnicodeWidthStr::width(text);
    if current >= width || (last && align == Align::Left) {
        return text.to_string();
    }

    let fill = " ".repeat(width - current);
    match align {
        Align::Left => format!("{}{}", text, fill),
        Align::Right => format!("{}{}", fill, text),
    }
}

/// Clips a value to the column's cap, ending it with an ellipsis
fn clip(text: &str, limit: Option<usize>) -> std::borrow::Cow<str> {
    let limit = match limit {
        Some(limit) if UnicodeWidthStr::width(text) > limit => limit,
        _ => return text.into(),
    };

    let mut clipped = String::new();
    let mut used = 0;
    for c in text.chars() {
        let next = used + UnicodeWidthChar::width(c).unwrap_or(0);
        if next > limit.saturating_sub(1) {
            break;
        }
        clipped.push(c);
        used = next;
    }
    clipped.push(ELLIPSIS);
    std::borrow::Cow::Owned(clipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(table: &Table) -> String {
        let mut out = Vec::new();
        table.render(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn columns_align_to_widest_value() {
        let mut table = Table::new(
            vec![ColumnSpec::left("Name"), ColumnSpec::left("Status")],
            false,
            false,
        );
        table.row(vec![Cell::plain("jars/a.jar"), Cell::plain("installed")]);
        table.row(vec![Cell::plain("macros/long-name.ijm"), Cell::plain("new")]);

        assert_eq!(
            "jars/a.jar            installed\nmacros/long-name.ijm  new\n",
            rendered(&table)
        );
    }

    #[test]
    fn header_counts_toward_width_and_last_column_stays_ragged() {
        let mut table = Table::new(
            vec![ColumnSpec::left("Name"), ColumnSpec::left("Status")],
            true,
            false,
        );
        table.row(vec![Cell::plain("x"), Cell::plain("ok")]);

        assert_eq!("Name  Status\nx     ok\n", rendered(&table));
    }

    #[test]
    fn right_aligned_columns_pad_in_front() {
        let mut table = Table::new(
            vec![ColumnSpec::left("Name"), ColumnSpec::right("Size")],
            false,
            false,
        );
        table.row(vec![Cell::plain("a"), Cell::plain("7")]);
        table.row(vec![Cell::plain("b"), Cell::plain("12345")]);

        assert_eq!("a      7\nb  12345\n", rendered(&table));
    }

    #[test]
    fn capped_columns_clip_with_ellipsis() {
        let mut table = Table::new(vec![ColumnSpec::capped("URL", 10)], false, false);
        table.row(vec![Cell::plain("https://updates.example.org/main/")]);
        table.row(vec![Cell::plain("short")]);

        assert_eq!("https://u…\nshort\n", rendered(&table));
    }

    #[test]
    fn short_rows_render_blank_cells() {
        let mut table = Table::new(
            vec![ColumnSpec::left("Name"), ColumnSpec::left("Site")],
            false,
            false,
        );
        table.row(vec![Cell::plain("lonely")]);

        assert_eq!("lonely\n", rendered(&table));
    }
}
