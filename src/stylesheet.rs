use crate::breakpoints::normalize_media_condition_to_etch;
use crate::importer::{StyleEntry, StyleMap, StyleMapEntry, StyleSet, element_style_id};
use crate::normalizer::{
    find_selector_token, is_identifier_char, normalize_bricks_id_selectors_in_css,
    replace_selector_token, split_selector_by_comma_respecting_parens,
};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::ops::Range;
use tracing::debug;

/// One style rule that targets a selector token, already rewritten relative
/// to that token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Enclosing conditional at-rules, outermost first.
    pub conditions: Vec<String>,
    /// `&`, `& > *`, `&:hover`, `.wrapper &`, ...
    pub selector: String,
    /// Reformatted body, one `prop: value;` per line.
    pub declarations: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaQueryBlock {
    /// Normalized prelude, e.g. `@media (width <= to-rem(767px))`.
    pub condition: String,
    /// Nested CSS for the token inside the block.
    pub css: String,
    /// Byte range of the whole at-rule in the scanned text.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Declaration(String),
    Block {
        prelude: String,
        body: String,
        span: Range<usize>,
    },
}

/// Per-class entries for every class in `stylesheet` that `style_map` tracks.
pub fn parse_class_rules(stylesheet: &str, style_map: &StyleMap) -> StyleSet {
    let stylesheet = normalize_bricks_id_selectors_in_css(stylesheet);
    let mut styles = StyleSet::new();

    let mut by_name: FxHashMap<&str, &StyleMapEntry> = FxHashMap::default();
    for entry in style_map.values() {
        let name = entry.selector.strip_prefix('.').unwrap_or(&entry.selector);
        by_name.entry(name).or_insert(entry);
    }

    for class_name in selector_names(&stylesheet, '.') {
        let selector = format!(".{}", class_name);
        let Some(mapped) = by_name.get(class_name.as_str()) else {
            debug!(class = %class_name, "skipping custom css outside the style map");
            continue;
        };

        let css = nest_rules_for_selector(&stylesheet, &selector);
        if css.is_empty() {
            continue;
        }
        debug!(class = %class_name, style_id = %mapped.id, "parsed custom class css");
        styles.insert(mapped.id.clone(), StyleEntry::class(&mapped.id, &selector, &css));
    }
    styles
}

/// One entry per `#id` selector, keyed by the stable element style id.
pub fn parse_id_rules(stylesheet: &str) -> StyleSet {
    let stylesheet = normalize_bricks_id_selectors_in_css(stylesheet);
    let mut styles = StyleSet::new();

    for id_name in selector_names(&stylesheet, '#') {
        let selector = format!("#{}", id_name);
        let css = nest_rules_for_selector(&stylesheet, &selector);
        if css.is_empty() {
            continue;
        }
        let style_id = element_style_id(&id_name);
        styles.insert(style_id.clone(), StyleEntry::class(&style_id, &selector, &css));
    }
    styles
}

/// All rules of `css` addressed by `token` (`.card`, `#etch-hero`), including
/// those inside `@media`, `@container` and `@supports`. Rules that do not
/// mention the token are ignored; unbalanced input yields what parsed cleanly.
pub fn extract_rules_for_selector(css: &str, token: &str) -> Vec<Rule> {
    let mut rules = Vec::new();
    collect_rules(css, token, &[], &mut rules);
    rules
}

/// Top-level conditional blocks holding rules for `token`, with their
/// condition normalized and inner selectors nested. `span` lets callers cut
/// the block out of the text before processing the remainder.
pub fn extract_media_queries(css: &str, token: &str) -> Vec<MediaQueryBlock> {
    parse_nodes(css)
        .into_iter()
        .filter_map(|node| {
            let Node::Block { prelude, body, span } = node else {
                return None;
            };
            let condition = conditional_at_rule(&prelude)?;
            let rules = extract_rules_for_selector(&body, token);
            if rules.is_empty() {
                return None;
            }
            Some(MediaQueryBlock {
                condition,
                css: render_rules(&rules, true),
                span,
            })
        })
        .collect()
}

/// Root declarations first, then nested rules, then conditional blocks.
pub fn nest_rules_for_selector(stylesheet: &str, token: &str) -> String {
    let media = extract_media_queries(stylesheet, token);

    let mut remaining = String::with_capacity(stylesheet.len());
    let mut cursor = 0;
    for block in &media {
        remaining.push_str(&stylesheet[cursor..block.span.start]);
        cursor = block.span.end;
    }
    remaining.push_str(&stylesheet[cursor..]);

    let mut parts = Vec::new();
    let rendered = render_rules(&extract_rules_for_selector(&remaining, token), false);
    if !rendered.is_empty() {
        parts.push(rendered);
    }

    let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
    for block in media {
        grouped.entry(block.condition).or_default().push(block.css);
    }
    for (condition, bodies) in grouped {
        parts.push(format!("{} {{\n{}\n}}", condition, indent(&bodies.join("\n"))));
    }
    parts.join("\n").trim().to_string()
}

/// Nesting form of the selector text that followed `token`.
pub fn normalize_selector_suffix_with_ampersand(raw: &str, token: &str) -> String {
    let suffix = raw.trim();
    if suffix.is_empty() {
        return "&".to_string();
    }
    let descendant = raw.starts_with(char::is_whitespace);
    let suffix = replace_selector_token(suffix, token, "&");

    split_selector_by_comma_respecting_parens(&suffix)
        .into_iter()
        .map(|part| match part.chars().next() {
            Some('&') => part,
            Some(combinator @ ('>' | '+' | '~')) => {
                let rest = part[combinator.len_utf8()..].trim_start();
                format!("& {} {}", combinator, rest).trim_end().to_string()
            }
            Some('.' | '#') if descendant => format!("& {}", part),
            _ if descendant && part.starts_with(|ch: char| ch.is_ascii_alphabetic() || ch == '*') => {
                format!("& {}", part)
            }
            _ => format!("&{}", part),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn collect_rules(css: &str, token: &str, conditions: &[String], rules: &mut Vec<Rule>) {
    for node in parse_nodes(css) {
        let Node::Block { prelude, body, .. } = node else {
            continue;
        };

        if prelude.starts_with('@') {
            if let Some(condition) = conditional_at_rule(&prelude) {
                let mut nested = conditions.to_vec();
                nested.push(condition);
                collect_rules(&body, token, &nested, rules);
            }
            continue;
        }

        let selectors: Vec<String> = split_selector_by_comma_respecting_parens(&prelude)
            .iter()
            .filter_map(|part| relative_selector(part, token))
            .collect();
        if selectors.is_empty() {
            continue;
        }
        let declarations = format_body(&body);
        if declarations.is_empty() {
            continue;
        }
        rules.push(Rule {
            conditions: conditions.to_vec(),
            selector: selectors.join(", "),
            declarations,
        });
    }
}

fn relative_selector(part: &str, token: &str) -> Option<String> {
    let start = find_selector_token(part, token, 0)?;
    if start == 0 {
        return Some(normalize_selector_suffix_with_ampersand(&part[token.len()..], token));
    }
    Some(replace_selector_token(part, token, "&"))
}

fn conditional_at_rule(prelude: &str) -> Option<String> {
    let keyword_end = prelude
        .find(|ch: char| ch.is_whitespace() || ch == '(')
        .unwrap_or(prelude.len());
    let keyword = prelude[..keyword_end].to_ascii_lowercase();
    let condition = prelude[keyword_end..].trim();
    match keyword.as_str() {
        "@media" | "@container" => Some(format!(
            "{} {}",
            keyword,
            normalize_media_condition_to_etch(condition)
        )),
        "@supports" => Some(format!("{} {}", keyword, condition)),
        _ => None,
    }
}

fn render_rules(rules: &[Rule], wrap_root: bool) -> String {
    let mut root: Vec<&str> = Vec::new();
    let mut nested: IndexMap<&str, Vec<&str>> = IndexMap::new();
    let mut conditional: IndexMap<&str, Vec<Rule>> = IndexMap::new();

    for rule in rules {
        if let Some((condition, inner)) = rule.conditions.split_first() {
            conditional.entry(condition.as_str()).or_default().push(Rule {
                conditions: inner.to_vec(),
                selector: rule.selector.clone(),
                declarations: rule.declarations.clone(),
            });
        } else if rule.selector == "&" && !wrap_root {
            if !root.contains(&rule.declarations.as_str()) {
                root.push(&rule.declarations);
            }
        } else {
            let bodies = nested.entry(rule.selector.as_str()).or_default();
            if !bodies.contains(&rule.declarations.as_str()) {
                bodies.push(&rule.declarations);
            }
        }
    }

    let mut parts = Vec::new();
    if !root.is_empty() {
        parts.push(root.join("\n"));
    }
    for (selector, bodies) in nested {
        parts.push(format!("{} {{\n{}\n}}", selector, indent(&bodies.join("\n"))));
    }
    for (condition, inner) in conditional {
        parts.push(format!("{} {{\n{}\n}}", condition, indent(&render_rules(&inner, true))));
    }
    parts.join("\n")
}

fn format_body(body: &str) -> String {
    let mut lines = Vec::new();
    for node in parse_nodes(body) {
        match node {
            Node::Declaration(raw) => {
                if let Some(declaration) = format_declaration(&raw) {
                    lines.push(declaration);
                }
            }
            Node::Block { prelude, body, .. } => {
                let inner = format_body(&body);
                let prelude = conditional_at_rule(&prelude).unwrap_or(prelude);
                if !prelude.is_empty() && !inner.is_empty() {
                    lines.push(format!("{} {{\n{}\n}}", prelude, indent(&inner)));
                }
            }
        }
    }
    lines.join("\n")
}

fn format_declaration(raw: &str) -> Option<String> {
    let (property, value) = raw.split_once(':')?;
    let property = property.trim();
    let value = value.trim();
    if property.is_empty() || value.is_empty() {
        return None;
    }
    Some(format!("{}: {};", property, value))
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("  {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Unique `.class` or `#id` names used in selector position, in order of
/// first appearance. Declaration values (hex colors, urls) are never scanned.
fn selector_names(css: &str, sigil: char) -> Vec<String> {
    let mut names = Vec::new();
    collect_selector_names(css, sigil, &mut names);
    names
}

fn collect_selector_names(css: &str, sigil: char, names: &mut Vec<String>) {
    for node in parse_nodes(css) {
        let Node::Block { prelude, body, .. } = node else {
            continue;
        };
        if prelude.starts_with('@') {
            if conditional_at_rule(&prelude).is_some() {
                collect_selector_names(&body, sigil, names);
            }
            continue;
        }
        for name in names_in_selector(&prelude, sigil) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
}

fn names_in_selector(selector: &str, sigil: char) -> Vec<String> {
    let mut names = Vec::new();
    let mut bracket_depth = 0usize;
    let mut in_string: Option<char> = None;

    for (idx, ch) in selector.char_indices() {
        if let Some(quote) = in_string {
            if ch == quote {
                in_string = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => in_string = Some(ch),
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            _ if ch == sigil && bracket_depth == 0 => {
                let name: String = selector[idx + ch.len_utf8()..]
                    .chars()
                    .take_while(|next| is_identifier_char(*next))
                    .collect();
                let valid_start = name
                    .chars()
                    .next()
                    .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || (sigil == '.' && first == '-'));
                if valid_start {
                    names.push(name);
                }
            }
            _ => {}
        }
    }
    names
}

/// Splits CSS into top-level declarations and blocks. Comments are dropped;
/// strings and parenthesized values are kept intact.
fn parse_nodes(css: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut buffer = String::new();
    let mut segment_start = 0usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut paren_depth = 0usize;
    let mut chars = css.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if let Some(quote) = in_string {
            buffer.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }

        if ch == '/' && matches!(chars.peek(), Some((_, '*'))) {
            let _ = chars.next();
            let mut previous = ' ';
            for (_, next) in chars.by_ref() {
                if previous == '*' && next == '/' {
                    break;
                }
                previous = next;
            }
            continue;
        }

        match ch {
            '"' | '\'' => {
                in_string = Some(ch);
                buffer.push(ch);
            }
            '(' => {
                paren_depth += 1;
                buffer.push(ch);
            }
            ')' => {
                paren_depth = paren_depth.saturating_sub(1);
                buffer.push(ch);
            }
            ';' if paren_depth == 0 => {
                push_declaration(&mut nodes, &buffer);
                buffer.clear();
                segment_start = idx + 1;
            }
            '{' => {
                let Some(close) = find_matching_brace_index(css, idx) else {
                    debug!(offset = idx, "unbalanced braces; ignoring the rest of the stylesheet");
                    return nodes;
                };
                let segment = &css[segment_start..idx];
                let start = segment_start + (segment.len() - segment.trim_start().len());
                nodes.push(Node::Block {
                    prelude: buffer.trim().to_string(),
                    body: css[idx + 1..close].to_string(),
                    span: start..close + 1,
                });
                buffer.clear();
                paren_depth = 0;
                while chars.peek().is_some_and(|(next, _)| *next <= close) {
                    let _ = chars.next();
                }
                segment_start = close + 1;
            }
            '}' => {
                buffer.clear();
                segment_start = idx + 1;
            }
            _ => buffer.push(ch),
        }
    }

    push_declaration(&mut nodes, &buffer);
    nodes
}

fn push_declaration(nodes: &mut Vec<Node>, buffer: &str) {
    let declaration = buffer.trim();
    if !declaration.is_empty() {
        nodes.push(Node::Declaration(declaration.to_string()));
    }
}

fn find_matching_brace_index(css: &str, open_idx: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_comment = false;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut chars = css[open_idx..].char_indices().peekable();

    while let Some((rel_idx, ch)) = chars.next() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }

        if in_comment {
            if ch == '*' && matches!(chars.peek(), Some((_, '/'))) {
                let _ = chars.next();
                in_comment = false;
            }
            continue;
        }

        match ch {
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                let _ = chars.next();
                in_comment = true;
            }
            '"' | '\'' => in_string = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open_idx + rel_idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{
        extract_media_queries, extract_rules_for_selector, nest_rules_for_selector,
        normalize_selector_suffix_with_ampersand, parse_class_rules, parse_id_rules,
    };
    use crate::importer::{StyleMap, StyleMapEntry, element_style_id};
    use pretty_assertions::assert_eq;

    fn strip_ws(css: &str) -> String {
        css.chars().filter(|ch| !ch.is_whitespace()).collect()
    }

    fn style_map(entries: &[(&str, &str, &str)]) -> StyleMap {
        entries
            .iter()
            .map(|(source, id, selector)| {
                (
                    source.to_string(),
                    StyleMapEntry {
                        id: id.to_string(),
                        selector: selector.to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn nests_single_line_stylesheet_for_class() {
        let css = nest_rules_for_selector(
            ".card{color:red}.card>*{color:blue}@media (max-width:767px){.card{color:green}}",
            ".card",
        );
        assert_eq!(
            strip_ws(&css),
            strip_ws(
                "color: red; & > * { color: blue; } @media (width <= to-rem(767px)) { & { color: green; } }"
            )
        );
    }

    #[test]
    fn rules_for_other_classes_are_ignored() {
        let rules = extract_rules_for_selector(
            ".card-title { color: red; } .card, .other { padding: 1rem } .list .card:hover { opacity: .8 }",
            ".card",
        );
        let selectors: Vec<&str> = rules.iter().map(|rule| rule.selector.as_str()).collect();
        assert_eq!(selectors, vec!["&", ".list &:hover"]);
        assert_eq!(rules[0].declarations, "padding: 1rem;");
    }

    #[test]
    fn media_blocks_report_span_and_normalized_condition() {
        let css = ".a { color: red; }\n@media (min-width: 1200px) { .a { gap: 2rem; } }\n.b { color: blue; }";
        let blocks = extract_media_queries(css, ".a");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].condition, "@media (width >= to-rem(1200px))");
        assert_eq!(strip_ws(&blocks[0].css), strip_ws("& { gap: 2rem; }"));
        assert!(css[blocks[0].span.clone()].starts_with("@media"));
        assert!(css[blocks[0].span.clone()].ends_with('}'));
        assert!(extract_media_queries(css, ".b").is_empty());
    }

    #[test]
    fn comments_and_strings_do_not_break_parsing() {
        let css = "/* .card { color: red } */ .card::before { content: \"}\"; } .card { background: url(data:image/png;base64,AAA) }";
        let nested = nest_rules_for_selector(css, ".card");
        assert_eq!(
            strip_ws(&nested),
            strip_ws("background: url(data:image/png;base64,AAA); &::before { content: \"}\"; }")
        );
    }

    #[test]
    fn unbalanced_input_degrades_to_parsed_prefix() {
        let rules = extract_rules_for_selector(".a { color: red; } .a:hover { color: blue;", ".a");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].selector, "&");
    }

    #[test]
    fn class_rules_need_a_style_map_entry() {
        let map = style_map(&[("abc123", "f00ba47", ".btn")]);
        let styles = parse_class_rules(".btn { color: red } .untracked { color: blue }", &map);
        assert_eq!(styles.len(), 1);
        let entry = &styles["f00ba47"];
        assert_eq!(entry.selector, ".btn");
        assert_eq!(entry.css, "color: red;");
        assert_eq!(entry.collection, "default");
        assert!(!entry.readonly);
    }

    #[test]
    fn id_rules_use_rewritten_ids_and_ignore_hex_colors() {
        let styles = parse_id_rules("#brxe-hero { color: #fff; } #brxe-hero > h1 { margin: 0 }");
        assert_eq!(styles.len(), 1);
        let id = element_style_id("etch-hero");
        let entry = &styles[&id];
        assert_eq!(entry.selector, "#etch-hero");
        assert_eq!(strip_ws(&entry.css), strip_ws("color: #fff; & > h1 { margin: 0; }"));
    }

    #[test]
    fn nested_input_rules_are_preserved() {
        let nested = nest_rules_for_selector(".nav { display: flex; &:hover { color: red } }", ".nav");
        assert_eq!(strip_ws(&nested), strip_ws("display: flex; &:hover { color: red; }"));
    }

    #[test]
    fn class_tokens_match_case_sensitively() {
        let nested = nest_rules_for_selector(".Card{color:blue}.card{color:red}", ".card");
        assert_eq!(nested, "color: red;");
        assert!(extract_rules_for_selector(".CARD:hover { color: blue }", ".card").is_empty());
    }

    #[test]
    fn media_nested_in_rule_body_is_normalized() {
        let nested = nest_rules_for_selector(".card{color:red; @media (max-width:767px){color:green}}", ".card");
        assert_eq!(
            strip_ws(&nested),
            strip_ws("color: red; @media (width <= to-rem(767px)) { color: green; }")
        );
    }

    #[test]
    fn class_rules_resolve_bare_and_dotted_map_selectors() {
        let map = style_map(&[
            ("abc123", "f00ba47", ".btn"),
            ("btn", "f00ba47", ".btn"),
            ("def456", "c0ffee1", "card"),
        ]);
        let styles = parse_class_rules(".btn { color: red } .card { gap: 1rem } .Card { gap: 0 }", &map);
        assert_eq!(styles.len(), 2);
        assert_eq!(styles["f00ba47"].css, "color: red;");
        assert_eq!(styles["c0ffee1"].selector, ".card");
        assert_eq!(styles["c0ffee1"].css, "gap: 1rem;");
    }

    #[test]
    fn suffix_normalization_rules() {
        assert_eq!(normalize_selector_suffix_with_ampersand("", ".card"), "&");
        assert_eq!(normalize_selector_suffix_with_ampersand(">*", ".card"), "& > *");
        assert_eq!(normalize_selector_suffix_with_ampersand("+ .card", ".card"), "& + &");
        assert_eq!(normalize_selector_suffix_with_ampersand("[aria-current]", ".card"), "&[aria-current]");
        assert_eq!(normalize_selector_suffix_with_ampersand(" p", ".card"), "& p");
        assert_eq!(normalize_selector_suffix_with_ampersand(".is-active", ".card"), "&.is-active");
        assert_eq!(normalize_selector_suffix_with_ampersand(" .icon", ".card"), "& .icon");
    }
}
