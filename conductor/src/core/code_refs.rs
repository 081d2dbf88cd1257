//! Detection of references to existing code in a task description.
//!
//! File paths and line ranges are extracted independently and then paired:
//! a range attaches to the nearest file mentioned in the same sentence.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::types::LineRange;

/// A file mentioned in a description, optionally narrowed to a line range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeRef {
    pub path: String,
    pub lines: Option<LineRange>,
}

/// Everything [`detect_code_refs`] found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeRefScan {
    /// File references in mention order.
    pub refs: Vec<CodeRef>,
    /// Explicit `line N` / `lines N-M` mentions with no file in the same sentence.
    pub line_mentions: Vec<LineRange>,
}

const EXTENSIONS: &str = "rs|py|pyi|ts|tsx|js|jsx|mjs|cjs|go|java|kt|kts|scala|rb|php|c|h|cc|cpp|cxx|hpp|hh|cs|swift|dart|lua|ex|exs|erl|hs|clj|sh|bash|zsh|ps1|sql|html|htm|css|scss|sass|less|vue|svelte|json|jsonc|yaml|yml|toml|ini|cfg|conf|xml|md|mdx|rst|txt|proto|graphql|gql|tf|ipynb|lock";

/// Technology names that look like file names but never refer to a file.
const NOT_PATHS: &[&str] = &[
    "node.js",
    "next.js",
    "nuxt.js",
    "vue.js",
    "react.js",
    "express.js",
    "three.js",
    "d3.js",
    "chart.js",
    "ember.js",
    "backbone.js",
    "angular.js",
    "alpine.js",
    "deno.js",
];

static FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?P<path>(?:[A-Za-z]:)?(?:\.{{1,2}}[/\\]|[/\\])?(?:[A-Za-z0-9_@.\-]+[/\\])*[A-Za-z0-9_\-][A-Za-z0-9_.\-]*\.(?:{EXTENSIONS}))\b(?::(?P<start>\d+)(?:\s*[-–]\s*(?P<end>\d+))?)?"
    );
    Regex::new(&pattern).expect("file reference pattern should be valid")
});

static EXPLICIT_LINES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\blines?\s+(?P<start>\d+)(?:\s*(?:-|–|to|through|thru)\s*(?P<end>\d+))?\b",
    )
    .expect("line range pattern should be valid")
});

static BARE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<start>\d+)\s*[-–]\s*(?P<end>\d+)\b").expect("bare range pattern should be valid")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z][A-Za-z0-9+.\-]*://\S+").expect("url pattern should be valid")
});

#[derive(Debug)]
struct FileMention {
    start: usize,
    sentence: usize,
    path: String,
    lines: Option<LineRange>,
}

#[derive(Debug)]
struct RangeMention {
    start: usize,
    end: usize,
    sentence: usize,
    range: LineRange,
    explicit: bool,
}

/// Scan `description` for file paths and line ranges.
///
/// Never fails. Text without path-like or line-range tokens yields an empty
/// scan.
pub fn detect_code_refs(description: &str) -> CodeRefScan {
    let text = mask_urls(description);
    let sentences = sentence_index(&text);

    let files = find_files(&text, &sentences);
    let ranges = find_ranges(&text, &sentences, &files);

    // Positioned refs: (byte offset, ref). Files come first at their own offset;
    // extra ranges for an already-narrowed file sit at the range's offset.
    let mut positioned: Vec<(usize, CodeRef)> = Vec::new();
    let mut attached: Vec<Option<LineRange>> = files.iter().map(|file| file.lines).collect();
    let mut line_mentions = Vec::new();

    for range in &ranges {
        let nearest = files
            .iter()
            .enumerate()
            .filter(|(_, file)| file.sentence == range.sentence)
            .min_by_key(|(_, file)| distance(file, range));
        match nearest {
            Some((index, file)) => {
                if attached[index].is_none() {
                    attached[index] = Some(range.range);
                } else {
                    positioned.push((
                        range.start,
                        CodeRef {
                            path: file.path.clone(),
                            lines: Some(range.range),
                        },
                    ));
                }
            }
            None if range.explicit => line_mentions.push(range.range),
            None => {}
        }
    }

    for (file, lines) in files.iter().zip(attached) {
        positioned.push((
            file.start,
            CodeRef {
                path: file.path.clone(),
                lines,
            },
        ));
    }
    positioned.sort_by_key(|(offset, _)| *offset);

    let mut refs: Vec<CodeRef> = Vec::with_capacity(positioned.len());
    for (_, code_ref) in positioned {
        if !refs.contains(&code_ref) {
            refs.push(code_ref);
        }
    }

    CodeRefScan {
        refs,
        line_mentions,
    }
}

fn find_files(text: &str, sentences: &[usize]) -> Vec<FileMention> {
    let mut files = Vec::new();
    for caps in FILE_RE.captures_iter(text) {
        let Some(path_match) = caps.name("path") else {
            continue;
        };
        let path = path_match.as_str();
        if is_technology_name(path) || preceded_by_word_char(text, path_match.start()) {
            continue;
        }
        let lines = caps.name("start").and_then(|start| {
            let start = parse_line(start.as_str())?;
            let end = match caps.name("end") {
                Some(end) => parse_line(end.as_str())?,
                None => start,
            };
            Some(LineRange::new(start, end))
        });
        files.push(FileMention {
            start: path_match.start(),
            sentence: sentences[path_match.start()],
            path: path.to_string(),
            lines,
        });
    }
    files
}

fn find_ranges(text: &str, sentences: &[usize], files: &[FileMention]) -> Vec<RangeMention> {
    let file_spans: Vec<(usize, usize)> = FILE_RE
        .find_iter(text)
        .map(|found| (found.start(), found.end()))
        .collect();

    let mut ranges = Vec::new();
    for caps in EXPLICIT_LINES_RE.captures_iter(text) {
        let (Some(whole), Some(start)) = (caps.get(0), caps.name("start")) else {
            continue;
        };
        let Some(start_line) = parse_line(start.as_str()) else {
            continue;
        };
        let end_line = match caps.name("end") {
            Some(end) => match parse_line(end.as_str()) {
                Some(value) => value,
                None => continue,
            },
            None => start_line,
        };
        ranges.push(RangeMention {
            start: whole.start(),
            end: whole.end(),
            sentence: sentences[whole.start()],
            range: LineRange::new(start_line, end_line),
            explicit: true,
        });
    }

    if files.is_empty() {
        ranges.sort_by_key(|range| range.start);
        return ranges;
    }

    let explicit_spans: Vec<(usize, usize)> =
        ranges.iter().map(|range| (range.start, range.end)).collect();
    for caps in BARE_RANGE_RE.captures_iter(text) {
        let (Some(whole), Some(start), Some(end)) =
            (caps.get(0), caps.name("start"), caps.name("end"))
        else {
            continue;
        };
        let span = (whole.start(), whole.end());
        if overlaps_any(span, &explicit_spans) || overlaps_any(span, &file_spans) {
            continue;
        }
        let (Some(start_line), Some(end_line)) =
            (parse_line(start.as_str()), parse_line(end.as_str()))
        else {
            continue;
        };
        // A descending bare pair ("10-3") reads as something other than a range.
        if start_line > end_line {
            continue;
        }
        let sentence = sentences[whole.start()];
        if !files.iter().any(|file| file.sentence == sentence) {
            continue;
        }
        ranges.push(RangeMention {
            start: whole.start(),
            end: whole.end(),
            sentence,
            range: LineRange::new(start_line, end_line),
            explicit: false,
        });
    }

    ranges.sort_by_key(|range| range.start);
    ranges
}

fn distance(file: &FileMention, range: &RangeMention) -> usize {
    let file_end = file.start + file.path.len();
    if range.start >= file_end {
        range.start - file_end
    } else if file.start >= range.end {
        file.start - range.end
    } else {
        0
    }
}

fn overlaps_any(span: (usize, usize), others: &[(usize, usize)]) -> bool {
    others
        .iter()
        .any(|(start, end)| span.0 < *end && *start < span.1)
}

fn parse_line(digits: &str) -> Option<u32> {
    digits.parse::<u32>().ok().filter(|line| *line > 0)
}

fn is_technology_name(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    NOT_PATHS.contains(&lowered.as_str())
}

fn preceded_by_word_char(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_some_and(|ch| ch.is_alphanumeric())
}

/// Replace URLs with spaces so their path segments are not read as files.
/// Byte offsets are preserved.
fn mask_urls(text: &str) -> String {
    let mut masked = text.to_string();
    for found in URL_RE.find_iter(text) {
        masked.replace_range(found.range(), &" ".repeat(found.len()));
    }
    masked
}

/// Sentence number for every byte offset of `text` (plus one past the end).
///
/// A sentence ends at `.`, `!`, `?` followed by whitespace, or at a newline.
fn sentence_index(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut index = Vec::with_capacity(bytes.len() + 1);
    let mut sentence = 0usize;
    for (offset, byte) in bytes.iter().enumerate() {
        index.push(sentence);
        let next_is_space = bytes
            .get(offset + 1)
            .is_none_or(|next| next.is_ascii_whitespace());
        if *byte == b'\n' || (matches!(byte, b'.' | b'!' | b'?') && next_is_space) {
            sentence += 1;
        }
    }
    index.push(sentence);
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_ref(path: &str, lines: Option<(u32, u32)>) -> CodeRef {
        CodeRef {
            path: path.to_string(),
            lines: lines.map(|(start, end)| LineRange::new(start, end)),
        }
    }

    #[test]
    fn attaches_explicit_range_to_bare_file_name() {
        let scan = detect_code_refs(
            "see existing implementation at lines 751-878 in project_cleanup_agent.py, compare with new approach",
        );
        assert_eq!(
            scan.refs,
            vec![code_ref("project_cleanup_agent.py", Some((751, 878)))]
        );
        assert!(scan.line_mentions.is_empty());
    }

    #[test]
    fn plain_prose_has_no_refs() {
        for text in [
            "",
            "Fix the null pointer bug in payment processor",
            "Add retries to the upload flow, e.g. three attempts at 9 a.m. daily",
            "Improve the Node.js service so it runs 2-3 times faster",
            "Version 1.2.3 broke the build; see https://example.com/docs/index.html",
        ] {
            let scan = detect_code_refs(text);
            assert!(scan.refs.is_empty(), "unexpected refs in {text:?}: {:?}", scan.refs);
        }
    }

    #[test]
    fn paths_with_separators_and_colon_ranges() {
        let scan = detect_code_refs("Update src/core/gate.rs:10-20 and tests/gate.rs:7");
        assert_eq!(
            scan.refs,
            vec![
                code_ref("src/core/gate.rs", Some((10, 20))),
                code_ref("tests/gate.rs", Some((7, 7))),
            ]
        );
    }

    #[test]
    fn windows_paths_are_detected() {
        let scan = detect_code_refs(r"Look at src\app\main.ts please");
        assert_eq!(scan.refs, vec![code_ref(r"src\app\main.ts", None)]);
    }

    #[test]
    fn range_attaches_only_within_the_same_sentence() {
        let scan = detect_code_refs("Check lines 5 to 9. The bug lives in lib.rs");
        assert_eq!(scan.refs, vec![code_ref("lib.rs", None)]);
        assert_eq!(scan.line_mentions, vec![LineRange::new(5, 9)]);
    }

    #[test]
    fn second_range_for_same_file_becomes_separate_ref() {
        let scan = detect_code_refs("In parser.py see lines 10-20 and lines 40-50");
        assert_eq!(
            scan.refs,
            vec![
                code_ref("parser.py", Some((10, 20))),
                code_ref("parser.py", Some((40, 50))),
            ]
        );
    }

    #[test]
    fn bare_ranges_need_a_file_in_the_sentence() {
        let scan = detect_code_refs("Handle 10-20 requests per second");
        assert!(scan.refs.is_empty());
        assert!(scan.line_mentions.is_empty());

        let scan = detect_code_refs("Rewrite 120-140 of handler.go");
        assert_eq!(scan.refs, vec![code_ref("handler.go", Some((120, 140)))]);
    }

    #[test]
    fn duplicate_mentions_are_reported_once() {
        let scan = detect_code_refs("config.toml is read twice; edit config.toml");
        assert_eq!(scan.refs, vec![code_ref("config.toml", None)]);
    }

    #[test]
    fn oversized_line_numbers_are_ignored() {
        let scan = detect_code_refs("lines 99999999999-100000000000 in a.rs");
        assert_eq!(scan.refs, vec![code_ref("a.rs", None)]);
    }
}
