//! Run-aware placeholder substitution.
//!
//! Word splits a paragraph's text into runs wherever formatting, spell-check
//! state or editing history changes, so a placeholder typed as `{{Price}}`
//! can be stored as `{{`, `Pri`, `ce}}` in three runs. Matching is therefore
//! done against the paragraph's concatenated text and every hit is mapped
//! back onto the run segments it covers.
//!
//! Rules:
//! - keys are literal and case-insensitive, applied one at a time in
//!   declaration order; each key sees the text left by the previous ones;
//! - a hit inside a single `w:t` is spliced in place, so the run keeps its
//!   formatting;
//! - a hit crossing run boundaries is written as the formatting of the
//!   paragraph's first run: the text before the hit stays where it was, the
//!   replacement follows it in a run carrying the first run's `w:rPr`, and the
//!   matched characters are removed from the runs that follow;
//! - a hit crossing segments of one run (a tab, a break) stays in that run.

use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::Result;
use crate::replacements::ReplacementSet;
use crate::traverse::{
    for_each_paragraph, is_run_container, paragraph_runs, W_BR, W_CR, W_R, W_RPR, W_T, W_TAB,
};
use crate::xml::{XmlElement, XmlNode};

/// How a hit that spans several runs is written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossRunStyle {
    /// Replacement text takes the formatting of the paragraph's first run;
    /// the other runs keep theirs.
    #[default]
    FirstRun,
    /// The whole paragraph is rebuilt as one run formatted like its first run.
    CollapseParagraph,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    value: String,
}

/// A compiled [`ReplacementSet`], ready to be applied to many paragraphs.
#[derive(Debug, Clone)]
pub struct Substitution {
    rules: Vec<Rule>,
    keys: Vec<String>,
    style: CrossRunStyle,
}

impl Substitution {
    pub fn new(set: &ReplacementSet, style: CrossRunStyle) -> Result<Self> {
        let mut rules = Vec::with_capacity(set.len());
        let mut keys = Vec::with_capacity(set.len());
        for (key, value) in set.iter() {
            let pattern = RegexBuilder::new(&regex::escape(key))
                .case_insensitive(true)
                .build()?;
            rules.push(Rule {
                pattern,
                value: value.to_string(),
            });
            keys.push(key.to_string());
        }
        Ok(Self { rules, keys, style })
    }

    /// Keys in application order; indexes line up with the hit counts returned by `apply_*`.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Apply every rule to one paragraph. Returns per-key hit counts.
    pub fn apply_to_paragraph(&self, paragraph: &mut XmlElement) -> Vec<usize> {
        let mut hits = vec![0; self.rules.len()];
        let mut removed_any = false;
        for (idx, rule) in self.rules.iter().enumerate() {
            let outcome = apply_rule(paragraph, rule, self.style);
            if outcome.hits > 0 {
                trace!(key = %self.keys[idx], hits = outcome.hits, "replaced in paragraph");
            }
            hits[idx] = outcome.hits;
            removed_any |= outcome.removed_segments;
        }
        if removed_any {
            prune_empty_runs(paragraph);
        }
        hits
    }

    /// Apply every rule to every paragraph under `root`. Returns per-key hit counts.
    pub fn apply_to_tree(&self, root: &mut XmlElement) -> Vec<usize> {
        let mut totals = vec![0; self.rules.len()];
        for_each_paragraph(root, &mut |p| {
            for (total, hits) in totals.iter_mut().zip(self.apply_to_paragraph(p)) {
                *total += hits;
            }
        });
        totals
    }
}

/// Compile `set` and apply it to a single paragraph. Returns the number of replacements.
pub fn replace_in_paragraph(
    paragraph: &mut XmlElement,
    set: &ReplacementSet,
    style: CrossRunStyle,
) -> Result<usize> {
    let substitution = Substitution::new(set, style)?;
    Ok(substitution.apply_to_paragraph(paragraph).into_iter().sum())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    Text,
    Tab,
    Break,
}

/// One text-bearing child of a run.
#[derive(Debug)]
struct Segment {
    run: usize,
    child: usize,
    kind: SegmentKind,
    start: usize,
    len: usize,
    text: String,
    dirty: bool,
    removed: bool,
}

impl Segment {
    fn end(&self) -> usize {
        self.start + self.len
    }

    fn contains_start(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end()
    }

    fn contains_end(&self, offset: usize) -> bool {
        self.start < offset && offset <= self.end()
    }

    /// Turn a tab or break into a text segment carrying `text`.
    fn become_text(&mut self, text: String) {
        self.kind = SegmentKind::Text;
        self.text = text;
        self.dirty = true;
    }
}

#[derive(Debug, Default)]
struct RuleOutcome {
    hits: usize,
    removed_segments: bool,
}

fn collect_segments(runs: &[&mut XmlElement]) -> (Vec<Segment>, String) {
    let mut segments = Vec::new();
    let mut text = String::new();
    for (run_idx, run) in runs.iter().enumerate() {
        for (child_idx, node) in run.children.iter().enumerate() {
            let XmlNode::Element(el) = node else { continue };
            let (kind, content) = match el.name.as_str() {
                W_T => (SegmentKind::Text, el.text()),
                W_TAB => (SegmentKind::Tab, "\t".to_string()),
                W_BR | W_CR => (SegmentKind::Break, "\n".to_string()),
                _ => continue,
            };
            segments.push(Segment {
                run: run_idx,
                child: child_idx,
                kind,
                start: text.len(),
                len: content.len(),
                text: content.clone(),
                dirty: false,
                removed: false,
            });
            text.push_str(&content);
        }
    }
    (segments, text)
}

fn apply_rule(paragraph: &mut XmlElement, rule: &Rule, style: CrossRunStyle) -> RuleOutcome {
    let mut runs = paragraph_runs(paragraph);
    let (mut segments, text) = collect_segments(&runs);

    let matches: Vec<(usize, usize)> = rule
        .pattern
        .find_iter(&text)
        .map(|m| (m.start(), m.end()))
        .collect();
    if matches.is_empty() {
        return RuleOutcome::default();
    }

    let first_props = runs.first().and_then(|run| run.child(W_RPR)).cloned();

    if style == CrossRunStyle::CollapseParagraph
        && matches
            .iter()
            .any(|&(s, e)| run_of(&segments, s, true) != run_of(&segments, e, false))
    {
        let rebuilt = rule.pattern.replace_all(&text, NoExpand(&rule.value)).into_owned();
        drop(runs);
        collapse_paragraph(paragraph, first_props, &rebuilt);
        return RuleOutcome {
            hits: matches.len(),
            removed_segments: false,
        };
    }

    let restyle: Vec<bool> = runs
        .iter()
        .map(|run| run.child(W_RPR) != first_props.as_ref())
        .collect();

    // Right to left: text left of the current hit is never touched by later edits.
    let mut split_runs = Vec::new();
    for &(start, end) in matches.iter().rev() {
        if let Some(run) = splice(&mut segments, start, end, &rule.value, &restyle) {
            split_runs.push(run);
        }
    }
    let removed_segments = segments.iter().any(|s| s.removed);
    write_back(&mut runs, &segments);

    if !split_runs.is_empty() && !rule.value.is_empty() {
        let mut inserts: Vec<(usize, XmlElement)> = split_runs
            .into_iter()
            .map(|run| (run, formatted_run(first_props.clone(), &rule.value)))
            .collect();
        insert_after_runs(paragraph, &mut 0, &mut inserts);
    }

    RuleOutcome {
        hits: matches.len(),
        removed_segments,
    }
}

fn run_of(segments: &[Segment], offset: usize, is_start: bool) -> Option<usize> {
    segments
        .iter()
        .find(|seg| {
            if is_start {
                seg.contains_start(offset)
            } else {
                seg.contains_end(offset)
            }
        })
        .map(|seg| seg.run)
}

/// Rewrite the segments covered by `start..end`.
///
/// Returns the run after which `value` must be inserted as a run of its own,
/// when the hit crosses runs and starts in a run formatted unlike the
/// paragraph's first one (`restyle`, indexed by run).
fn splice(
    segments: &mut [Segment],
    start: usize,
    end: usize,
    value: &str,
    restyle: &[bool],
) -> Option<usize> {
    let first = segments.iter().position(|seg| seg.contains_start(start))?;
    let last = segments.iter().position(|seg| seg.contains_end(end))?;

    if first == last {
        let seg = &mut segments[first];
        match seg.kind {
            SegmentKind::Text => {
                let local = (start - seg.start)..(end - seg.start);
                seg.text.replace_range(local, value);
                seg.dirty = true;
            }
            SegmentKind::Tab | SegmentKind::Break => seg.become_text(value.to_string()),
        }
        return None;
    }

    let receiving_run = segments[first].run;
    let split_off = receiving_run != segments[last].run
        && restyle.get(receiving_run).copied().unwrap_or(false);
    {
        let seg = &mut segments[first];
        match seg.kind {
            SegmentKind::Text => {
                seg.text.truncate(start - seg.start);
                if !split_off {
                    seg.text.push_str(value);
                }
                if seg.text.is_empty() {
                    seg.removed = true;
                } else {
                    seg.dirty = true;
                }
            }
            SegmentKind::Tab | SegmentKind::Break if split_off => seg.removed = true,
            SegmentKind::Tab | SegmentKind::Break => seg.become_text(value.to_string()),
        }
    }

    for seg in &mut segments[first + 1..last] {
        seg.removed = true;
    }

    let seg = &mut segments[last];
    match seg.kind {
        SegmentKind::Text => {
            seg.text.drain(..end - seg.start);
            if seg.text.is_empty() {
                seg.removed = true;
            } else {
                seg.dirty = true;
            }
        }
        SegmentKind::Tab | SegmentKind::Break => seg.removed = true,
    }
    split_off.then_some(receiving_run)
}

fn write_back(runs: &mut [&mut XmlElement], segments: &[Segment]) {
    // Reverse order keeps child indexes valid while removing.
    for seg in segments.iter().rev() {
        let run = &mut runs[seg.run];
        if seg.removed {
            run.children.remove(seg.child);
        } else if seg.dirty {
            match &mut run.children[seg.child] {
                XmlNode::Element(el) if el.is(W_T) => set_run_text(el, &seg.text),
                node => *node = XmlNode::Element(text_element(&seg.text)),
            }
        }
    }
}

fn formatted_run(props: Option<XmlElement>, text: &str) -> XmlElement {
    let mut run = XmlElement::new(W_R);
    if let Some(props) = props {
        run.children.push(XmlNode::Element(props));
    }
    run.children.push(XmlNode::Element(text_element(text)));
    run
}

/// Insert each run of `inserts` right after the paragraph run it is keyed by.
///
/// Runs are counted in the order [`paragraph_runs`] yields them; inserted runs
/// are not counted.
fn insert_after_runs(
    el: &mut XmlElement,
    next_run: &mut usize,
    inserts: &mut Vec<(usize, XmlElement)>,
) {
    let mut i = 0;
    while i < el.children.len() && !inserts.is_empty() {
        if let XmlNode::Element(child) = &mut el.children[i] {
            if child.is(W_R) {
                let idx = *next_run;
                *next_run += 1;
                if let Some(pos) = inserts.iter().position(|(run, _)| *run == idx) {
                    let (_, run) = inserts.swap_remove(pos);
                    el.children.insert(i + 1, XmlNode::Element(run));
                    i += 1;
                }
            } else if is_run_container(child) {
                insert_after_runs(child, next_run, inserts);
            }
        }
        i += 1;
    }
}

pub(crate) fn text_element(text: &str) -> XmlElement {
    let mut el = XmlElement::new(W_T);
    set_run_text(&mut el, text);
    el
}

fn set_run_text(el: &mut XmlElement, text: &str) {
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        el.set_attr("xml:space", "preserve");
    }
    el.set_text(text);
}

/// Replace all of the paragraph's runs with one run carrying `props` and `text`.
fn collapse_paragraph(paragraph: &mut XmlElement, props: Option<XmlElement>, text: &str) {
    let insert_at = paragraph
        .children
        .iter()
        .position(|node| matches!(node, XmlNode::Element(el) if el.is(W_R) || is_run_container(el)))
        .unwrap_or(paragraph.children.len());
    remove_runs(paragraph);

    let mut run = XmlElement::new(W_R);
    if let Some(props) = props {
        run.children.push(XmlNode::Element(props));
    }
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            run.children.push(XmlNode::Element(XmlElement::new(W_BR)));
        }
        for (j, piece) in line.split('\t').enumerate() {
            if j > 0 {
                run.children.push(XmlNode::Element(XmlElement::new(W_TAB)));
            }
            if !piece.is_empty() {
                run.children.push(XmlNode::Element(text_element(piece)));
            }
        }
    }

    let insert_at = insert_at.min(paragraph.children.len());
    paragraph.children.insert(insert_at, XmlNode::Element(run));
}

fn remove_runs(el: &mut XmlElement) {
    el.children
        .retain(|node| !matches!(node, XmlNode::Element(child) if child.is(W_R)));
    for child in el.elements_mut() {
        if is_run_container(child) {
            remove_runs(child);
        }
    }
}

/// Drop runs whose text was consumed entirely by a cross-run replacement.
fn prune_empty_runs(el: &mut XmlElement) {
    el.children.retain(|node| match node {
        XmlNode::Element(child) if child.is(W_R) => child.elements().any(|c| !c.is(W_RPR)),
        _ => true,
    });
    for child in el.elements_mut() {
        if is_run_container(child) {
            prune_empty_runs(child);
        }
    }
}
