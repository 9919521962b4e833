//! Tokenizer for model-authored project output.
//!
//! The model answers inside an `<artifact>` wrapper containing action tags:
//!
//! ```text
//! <artifact title="...">
//!   <action type="file" path="app/page.tsx">...file body...</action>
//!   <action type="diff" path="app/globals.css">
//!     <old>...exact current text...</old>
//!     <new>...replacement...</new>
//!   </action>
//! </artifact>
//! ```
//!
//! Output is frequently cut off mid-token, so the scanner is a small state
//! machine over the raw text rather than a pattern match: reaching the end of
//! input is an ordinary transition out of every state.

use super::types::{normalize_path, FileDiff, GeneratedFile};

/// Opening marker of the response wrapper.
pub const WRAPPER_OPEN: &str = "<artifact";
/// Closing marker of the response wrapper.
pub const WRAPPER_CLOSE: &str = "</artifact>";

const ACTION_OPEN: &str = "<action";
const ACTION_CLOSE: &str = "</action>";
const OLD_OPEN: &str = "<old>";
const OLD_CLOSE: &str = "</old>";
const NEW_OPEN: &str = "<new>";
const NEW_CLOSE: &str = "</new>";

/// One typed unit recovered from model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write a whole file.
    File(GeneratedFile),
    /// Edit part of an existing file.
    Diff(FileDiff),
}

/// Everything the tokenizer recovered from one piece of model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    /// Actions in document order.
    pub actions: Vec<Action>,
    /// Whether the wrapper close marker was seen.
    pub wrapper_closed: bool,
    /// Whether an action (or its opening tag) ran into end of input.
    pub unterminated: bool,
}

impl ParsedOutput {
    /// File actions in document order.
    pub fn files(&self) -> impl Iterator<Item = &GeneratedFile> {
        self.actions.iter().filter_map(|a| match a {
            Action::File(f) => Some(f),
            Action::Diff(_) => None,
        })
    }

    /// Diff actions in document order.
    pub fn diffs(&self) -> impl Iterator<Item = &FileDiff> {
        self.actions.iter().filter_map(|a| match a {
            Action::Diff(d) => Some(d),
            Action::File(_) => None,
        })
    }

    /// Number of file actions.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files().count()
    }

    /// Whether this output, taken as a first turn, has to be continued.
    #[must_use]
    pub fn needs_continuation(&self) -> bool {
        self.file_count() == 0 || !self.wrapper_closed || self.unterminated
    }
}

/// Scanner position relative to the action grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    InFileBody,
    InDiffBody,
    InDiffOld,
    InDiffNew,
}

/// Parses raw model text into actions. Never fails.
#[must_use]
pub fn parse_output(text: &str) -> ParsedOutput {
    Tokenizer::new(text).run()
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    state: ScanState,
    out: ParsedOutput,
}

/// Partially-built action carried between states.
#[derive(Default)]
struct Pending<'a> {
    path: String,
    old: Option<&'a str>,
    new: Option<&'a str>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            state: ScanState::Outside,
            out: ParsedOutput::default(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Finds `needle` after the cursor, returning its absolute offset.
    fn find(&self, needle: &str) -> Option<usize> {
        self.rest().find(needle).map(|idx| self.pos + idx)
    }

    fn run(mut self) -> ParsedOutput {
        self.out.wrapper_closed = self.input.contains(WRAPPER_CLOSE);
        let mut pending = Pending::default();

        loop {
            match self.state {
                ScanState::Outside => match self.open_action() {
                    Some((ActionKind::File, path)) => {
                        pending = Pending {
                            path,
                            ..Pending::default()
                        };
                        self.state = ScanState::InFileBody;
                    }
                    Some((ActionKind::Diff, path)) => {
                        pending = Pending {
                            path,
                            ..Pending::default()
                        };
                        self.state = ScanState::InDiffBody;
                    }
                    Some((ActionKind::Other, _)) => self.skip_action(),
                    None => break,
                },
                ScanState::InFileBody => {
                    let body = self.take_until(ACTION_CLOSE);
                    self.out.actions.push(Action::File(GeneratedFile {
                        path: std::mem::take(&mut pending.path),
                        content: decode_entities(trim_body(body)),
                    }));
                    self.state = ScanState::Outside;
                }
                ScanState::InDiffBody => {
                    let close = self.find(ACTION_CLOSE);
                    let next_old = self
                        .find(OLD_OPEN)
                        .filter(|&i| close.map_or(true, |c| i < c));
                    let next_new = self
                        .find(NEW_OPEN)
                        .filter(|&i| close.map_or(true, |c| i < c));
                    match (next_old, next_new) {
                        (Some(o), n) if pending.old.is_none() && n.map_or(true, |n| o < n) => {
                            self.pos = o + OLD_OPEN.len();
                            self.state = ScanState::InDiffOld;
                        }
                        (_, Some(n)) if pending.new.is_none() => {
                            self.pos = n + NEW_OPEN.len();
                            self.state = ScanState::InDiffNew;
                        }
                        _ => self.finish_diff(&mut pending, close),
                    }
                }
                ScanState::InDiffOld => {
                    pending.old = self.take_block(OLD_CLOSE);
                    self.state = ScanState::InDiffBody;
                }
                ScanState::InDiffNew => {
                    pending.new = self.take_block(NEW_CLOSE);
                    self.state = ScanState::InDiffBody;
                }
            }
        }

        self.out
    }

    /// Consumes the next `<action ...>` tag and classifies it.
    fn open_action(&mut self) -> Option<(ActionKind, String)> {
        loop {
            let start = self.find(ACTION_OPEN)?;
            let after_name = start + ACTION_OPEN.len();
            // `<actions>` or `<actionFoo` are not action tags.
            let boundary = self.input[after_name..].chars().next();
            if !matches!(boundary, Some(c) if c.is_whitespace() || c == '>' || c == '/') {
                if boundary.is_none() {
                    self.out.unterminated = true;
                    self.pos = self.input.len();
                    return None;
                }
                self.pos = after_name;
                continue;
            }
            let Some(tag_end) = self.input[after_name..].find('>').map(|i| after_name + i) else {
                self.out.unterminated = true;
                self.pos = self.input.len();
                return None;
            };
            let attrs = parse_attributes(&self.input[after_name..tag_end]);
            self.pos = tag_end + 1;

            let kind = match attr(&attrs, "type") {
                Some("file") => ActionKind::File,
                Some("diff") => ActionKind::Diff,
                _ => ActionKind::Other,
            };
            let path = attr(&attrs, "path")
                .map(decode_entities)
                .unwrap_or_default();
            let path = normalize_path(&path);
            if path.is_empty() {
                return Some((ActionKind::Other, String::new()));
            }
            return Some((kind, path.to_string()));
        }
    }

    /// Takes the text up to `marker` (consuming it), or the rest of input.
    fn take_until(&mut self, marker: &str) -> &'a str {
        if let Some(end) = self.find(marker) {
            let body = &self.input[self.pos..end];
            self.pos = end + marker.len();
            body
        } else {
            let body = self.rest();
            self.out.unterminated = true;
            self.pos = self.input.len();
            body
        }
    }

    /// Takes a nested diff block; `None` when its close marker never arrives.
    fn take_block(&mut self, close: &str) -> Option<&'a str> {
        let action_end = self.find(ACTION_CLOSE);
        match self.find(close) {
            Some(end) if action_end.map_or(true, |a| end < a) => {
                let body = &self.input[self.pos..end];
                self.pos = end + close.len();
                Some(body)
            }
            _ => None,
        }
    }

    fn finish_diff(&mut self, pending: &mut Pending<'a>, close: Option<usize>) {
        match close {
            Some(end) => self.pos = end + ACTION_CLOSE.len(),
            None => {
                self.out.unterminated = true;
                self.pos = self.input.len();
            }
        }
        if let (Some(old), Some(new)) = (pending.old.take(), pending.new.take()) {
            self.out.actions.push(Action::Diff(FileDiff {
                path: std::mem::take(&mut pending.path),
                old_content: decode_entities(trim_body(old)),
                new_content: decode_entities(trim_body(new)),
            }));
        }
        *pending = Pending::default();
        self.state = ScanState::Outside;
    }

    fn skip_action(&mut self) {
        let _ = self.take_until(ACTION_CLOSE);
        self.state = ScanState::Outside;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    File,
    Diff,
    Other,
}

fn attr<'s>(attrs: &'s [(String, String)], name: &str) -> Option<&'s str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Parses `key="value"` / `key='value'` pairs from the inside of a tag.
fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = raw.trim_end_matches('/');
    loop {
        rest = rest.trim_start();
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_ascii_lowercase();
        let after = rest[eq + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            // Unquoted value: read to the next whitespace.
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            attrs.push((key, after[..end].to_string()));
            rest = &after[end..];
            continue;
        };
        let value_start = quote.len_utf8();
        let Some(close) = after[value_start..].find(quote) else {
            break;
        };
        attrs.push((key, after[value_start..value_start + close].to_string()));
        rest = &after[value_start + close + quote.len_utf8()..];
    }
    attrs
}

/// Strips one leading and one trailing line break from an action body.
fn trim_body(body: &str) -> &str {
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);
    body.strip_suffix("\r\n")
        .or_else(|| body.strip_suffix('\n'))
        .unwrap_or(body)
}

/// Decodes the HTML entities models emit when escaping file content.
///
/// Unknown or malformed entities are kept verbatim.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(text: &str) -> Vec<GeneratedFile> {
        parse_output(text).files().cloned().collect()
    }

    #[test]
    fn single_file_action() {
        let parsed = parse_output(r#"<action type="file" path="app/page.tsx">hello</action>"#);
        assert_eq!(
            parsed.files().cloned().collect::<Vec<_>>(),
            vec![GeneratedFile::new("app/page.tsx", "hello")]
        );
        assert!(!parsed.unterminated);
    }

    #[test]
    fn unclosed_file_action_keeps_partial_body() {
        let text = "<artifact>\n<action type=\"file\" path=\"app/page.tsx\">\nexport default function Page() {\n  return <main>";
        let parsed = parse_output(text);
        let got: Vec<_> = parsed.files().cloned().collect();
        assert_eq!(got.len(), 1);
        assert_eq!(
            got[0].content,
            "export default function Page() {\n  return <main>"
        );
        assert!(parsed.unterminated);
        assert!(parsed.needs_continuation());
    }

    #[test]
    fn complete_wrapper_does_not_need_continuation() {
        let text = r#"<artifact title="site">
<action type="file" path="a.ts">
const a = 1;
</action>
</artifact>"#;
        let parsed = parse_output(text);
        assert_eq!(parsed.file_count(), 1);
        assert!(parsed.wrapper_closed);
        assert!(!parsed.needs_continuation());
        assert_eq!(files(text)[0].content, "const a = 1;");
    }

    #[test]
    fn missing_wrapper_close_needs_continuation() {
        let parsed = parse_output(r#"<artifact><action type="file" path="a">x</action>"#);
        assert_eq!(parsed.file_count(), 1);
        assert!(parsed.needs_continuation());
    }

    #[test]
    fn empty_input_yields_nothing() {
        let parsed = parse_output("");
        assert!(parsed.actions.is_empty());
        assert!(parsed.needs_continuation());
    }

    #[test]
    fn multiple_actions_in_document_order_without_dedup() {
        let text = r#"<action type="file" path="b">1</action>
<action path='a' type='file'>2</action>
<action type="file" path="b">3</action>"#;
        let got = files(text);
        let paths: Vec<&str> = got.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["b", "a", "b"]);
        assert_eq!(got[2].content, "3");
    }

    #[test]
    fn diff_action_with_both_blocks() {
        let text = r#"<action type="diff" path="app/globals.css">
<old>
color: red;
</old>
<new>
color: blue;
</new>
</action>"#;
        let parsed = parse_output(text);
        let diffs: Vec<_> = parsed.diffs().cloned().collect();
        assert_eq!(
            diffs,
            vec![FileDiff {
                path: "app/globals.css".into(),
                old_content: "color: red;".into(),
                new_content: "color: blue;".into(),
            }]
        );
    }

    #[test]
    fn diff_missing_new_block_is_dropped() {
        let text = r#"<action type="diff" path="a.css"><old>x</old></action>
<action type="file" path="b.css">y</action>"#;
        let parsed = parse_output(text);
        assert_eq!(parsed.diffs().count(), 0);
        assert_eq!(files(text), vec![GeneratedFile::new("b.css", "y")]);
    }

    #[test]
    fn diff_with_truncated_new_block_is_dropped() {
        let parsed = parse_output(r#"<action type="diff" path="a.css"><old>x</old><new>par"#);
        assert_eq!(parsed.diffs().count(), 0);
        assert!(parsed.unterminated);
    }

    #[test]
    fn diff_blocks_may_come_in_either_order() {
        let parsed =
            parse_output(r#"<action type="diff" path="a"><new>N</new><old>O</old></action>"#);
        let diff = parsed.diffs().next().unwrap();
        assert_eq!(diff.old_content, "O");
        assert_eq!(diff.new_content, "N");
    }

    #[test]
    fn entities_are_decoded_in_path_and_content() {
        let text = r#"<action type="file" path="a&amp;b.tsx">&lt;div className=&quot;x&quot;&gt;&#39;hi&#x27;&lt;/div&gt;</action>"#;
        let got = files(text);
        assert_eq!(got[0].path, "a&b.tsx");
        assert_eq!(got[0].content, "<div className=\"x\">'hi'</div>");
    }

    #[test]
    fn unknown_entities_are_left_alone() {
        assert_eq!(
            decode_entities("a &copy; b & c &#xZZ;"),
            "a &copy; b & c &#xZZ;"
        );
    }

    #[test]
    fn truncated_opening_tag_emits_nothing() {
        let parsed = parse_output(r#"<action type="file" path="app/pa"#);
        assert!(parsed.actions.is_empty());
        assert!(parsed.unterminated);
    }

    #[test]
    fn actions_without_path_or_known_type_are_skipped() {
        let text = r#"<action type="shell">npm install</action>
<action type="file">orphan</action>
<action type="file" path="ok.ts">fine</action>"#;
        assert_eq!(files(text), vec![GeneratedFile::new("ok.ts", "fine")]);
    }

    #[test]
    fn similarly_named_tags_are_not_actions() {
        let text = r#"<actions><action type="file" path="x">1</action></actions>"#;
        assert_eq!(files(text), vec![GeneratedFile::new("x", "1")]);
    }

    #[test]
    fn root_style_paths_are_made_relative() {
        let text = r#"<action type="file" path="/app/page.tsx">a</action>
<action type="diff" path="./app/page.tsx"><old>a</old><new>b</new></action>"#;
        let parsed = parse_output(text);
        assert_eq!(
            parsed.files().next().map(|f| f.path.as_str()),
            Some("app/page.tsx")
        );
        assert_eq!(
            parsed.diffs().next().map(|d| d.path.as_str()),
            Some("app/page.tsx")
        );
    }
}
