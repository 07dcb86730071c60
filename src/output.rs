//! Terminal rendering of ranked results and highlight marks

use crate::session::SearchResults;
use std::io::{self, Write};
use std::ops::Range;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print one page of results, best first
pub fn print_results(results: &SearchResults, color: bool) -> io::Result<()> {
    let mut out = stdout(color);
    write_results(&mut out, results)
}

pub fn write_results<W: WriteColor>(out: &mut W, results: &SearchResults) -> io::Result<()> {
    let first_rank = results.page * results.page_size + 1;

    for (offset, doc) in results.documents.iter().enumerate() {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(out, "{:>4}", first_rank + offset)?;
        out.reset()?;

        out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        write!(out, "  {:.4}  ", doc.probability)?;
        out.reset()?;

        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
        writeln!(out, "{}", doc.id)?;
        out.reset()?;
    }

    // Summary line
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
    writeln!(
        out,
        "-- page {} ({} ranked documents, marginal {:.4})",
        results.page + 1,
        results.total,
        results.marginal
    )?;
    out.reset()?;

    Ok(())
}

/// Print results as a JSON document
pub fn print_json(results: &SearchResults) -> io::Result<()> {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    serde_json::to_writer_pretty(&mut lock, results)?;
    writeln!(lock)
}

/// Print the lines of `content` containing marks, with marks highlighted
pub fn print_marked(content: &str, marks: &[Range<usize>], color: bool) -> io::Result<()> {
    let mut out = stdout(color);
    write_marked(&mut out, content, marks)
}

pub fn write_marked<W: WriteColor>(
    out: &mut W,
    content: &str,
    marks: &[Range<usize>],
) -> io::Result<()> {
    let mut marks = marks.iter().peekable();
    let mut line_start = 0;

    for (line_num, line) in content.split('\n').enumerate() {
        let line_end = line_start + line.len();

        let mut spans = Vec::new();
        while let Some(mark) = marks.peek() {
            if mark.start > line_end {
                break;
            }
            // Clip marks that continue onto the next line
            let start = mark.start.max(line_start) - line_start;
            let end = mark.end.min(line_end) - line_start;
            if end > start {
                spans.push(start..end);
            }
            if mark.end > line_end + 1 {
                break;
            }
            marks.next();
        }

        if !spans.is_empty() {
            write_line(out, line_num + 1, line, &spans)?;
        }
        line_start = line_end + 1;
    }

    Ok(())
}

fn write_line<W: WriteColor>(
    out: &mut W,
    line_num: usize,
    line: &str,
    spans: &[Range<usize>],
) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(out, "{}", line_num)?;
    out.reset()?;
    write!(out, ":")?;

    let mut cursor = 0;
    for span in spans {
        let (start, end) = (span.start.max(cursor), span.end);
        if start > cursor {
            write!(out, "{}", safe_slice(line, cursor, start))?;
        }
        if end > start {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
            write!(out, "{}", safe_slice(line, start, end))?;
            out.reset()?;
        }
        cursor = cursor.max(end);
    }
    if cursor < line.len() {
        write!(out, "{}", safe_slice(line, cursor, line.len()))?;
    }
    writeln!(out)
}

/// Slice clamped to the string and widened to char boundaries
fn safe_slice(s: &str, start: usize, end: usize) -> &str {
    let mut start = start.min(s.len());
    let mut end = end.min(s.len());
    while !s.is_char_boundary(start) {
        start -= 1;
    }
    while !s.is_char_boundary(end) {
        end += 1;
    }
    &s[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posterior::RankedDocument;
    use crate::source::DocId;
    use termcolor::NoColor;

    fn render_marked(content: &str, marks: &[Range<usize>]) -> String {
        let mut out = NoColor::new(Vec::new());
        write_marked(&mut out, content, marks).unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    #[test]
    fn test_marked_prints_only_matching_lines() {
        let content = "first line\nsecond foo\nthird\nfoo again";
        let marks = vec![18..21, 28..31];
        assert_eq!(render_marked(content, &marks), "2:second foo\n4:foo again\n");
    }

    #[test]
    fn test_mark_spanning_lines_is_clipped() {
        let content = "ab\ncd";
        let output = render_marked(content, &[1..4]);
        assert_eq!(output, "1:ab\n2:cd\n");
    }

    #[test]
    fn test_results_layout() {
        let results = SearchResults {
            page: 1,
            page_size: 2,
            total: 5,
            marginal: 1.5,
            documents: vec![
                RankedDocument::new(DocId::from("src/a.rs"), 0.7),
                RankedDocument::new(DocId::from("src/b.rs"), 0.3),
            ],
        };
        let mut out = NoColor::new(Vec::new());
        write_results(&mut out, &results).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "   3  0.7000  src/a.rs");
        assert_eq!(lines[1], "   4  0.3000  src/b.rs");
        assert!(lines[2].starts_with("-- page 2 (5 ranked"));
    }

    #[test]
    fn test_safe_slice_respects_char_boundaries() {
        assert_eq!(safe_slice("héllo", 1, 2), "é");
        assert_eq!(safe_slice("abc", 2, 10), "c");
    }
}
