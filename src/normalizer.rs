use regex::{Captures, Regex};
use std::sync::LazyLock;

static GRID_SPAN_PLACEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(grid-column|grid-row)\s*:\s*span\s+(\d+)\s*/\s*([^;}]+?)(;|\s*\})")
        .expect("grid placement pattern")
});
static HSL_FUNCTION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)hsl\(\s*var\(\s*--([a-z0-9_-]+)-hsl\s*\)\s*(?:/\s*([^)]+))?\)")
        .expect("hsl function pattern")
});
static HSL_VAR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)var\(\s*--([a-z0-9_-]+)-hsl\s*\)").expect("hsl var pattern")
});
static GAP_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(row-gap|column-gap|gap)\s*:\s*([a-z][a-z0-9_-]*)\s*;")
        .expect("gap identifier pattern")
});
static GAP_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(row-gap|column-gap)\s*:\s*([^;{}]+);\s*(row-gap|column-gap)\s*:\s*([^;{}]+?)\s*;")
        .expect("gap pair pattern")
});
static RULE_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("rule body pattern"));
static FR_CONTAINER_GAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)var\(\s*--fr-container-gap\s*\)").expect("container gap pattern")
});
static FR_CARD_GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)var\(\s*--fr-card-gap\s*\)").expect("card gap pattern"));
static FR_CARD_PADDING_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)--fr-card-padding\s*:").expect("card padding pattern"));
static FR_CARD_PADDING_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)var\(\s*--fr-card-padding\s*\)").expect("card padding var pattern")
});
static FR_CLASS_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.fr-([a-zA-Z0-9_-])").expect("fr class pattern"));
static TRANSPARENCY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)var\(\s*--([a-z0-9_-]+?)-trans-([0-9]{1,3})\s*\)")
        .expect("transparency token pattern")
});
static PHYSICAL_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(margin-top|margin-right|margin-bottom|margin-left|padding-top|padding-right|padding-bottom|padding-left|border-top|border-right|border-bottom|border-left|min-width|min-height|max-width|max-height|width|height|top|right|bottom|left)\s*:",
    )
    .expect("physical property pattern")
});
static BRICKS_ID_SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#brxe-([a-zA-Z0-9_-]+)").expect("id selector pattern"));
static CONTENT_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(attr|counter|counters)\s*\(").expect("content function pattern")
});
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static SEMICOLON_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";{2,}").expect("semicolon pattern"));

const QUAD_GROUPS: &[([&str; 4], &str)] = &[
    (
        [
            "inset-block-start",
            "inset-inline-end",
            "inset-block-end",
            "inset-inline-start",
        ],
        "inset",
    ),
    (
        [
            "padding-block-start",
            "padding-inline-end",
            "padding-block-end",
            "padding-inline-start",
        ],
        "padding",
    ),
    (
        [
            "margin-block-start",
            "margin-inline-end",
            "margin-block-end",
            "margin-inline-start",
        ],
        "margin",
    ),
    (
        [
            "border-start-start-radius",
            "border-start-end-radius",
            "border-end-end-radius",
            "border-end-start-radius",
        ],
        "border-radius",
    ),
    (
        [
            "border-top-left-radius",
            "border-top-right-radius",
            "border-bottom-right-radius",
            "border-bottom-left-radius",
        ],
        "border-radius",
    ),
];

const CSS_WIDE_KEYWORDS: &[&str] = &["normal", "inherit", "initial", "unset", "revert", "revert-layer"];

const CONTENT_KEYWORDS: &[&str] = &[
    "normal",
    "none",
    "open-quote",
    "close-quote",
    "no-open-quote",
    "no-close-quote",
    "inherit",
    "initial",
    "unset",
    "revert",
    "revert-layer",
];

/// Last pass over every produced style body.
pub fn normalize_final_css(css: &str) -> String {
    let css = normalize_deprecated_hsl_references(css);
    normalize_invalid_grid_placement(&css)
}

/// `grid-column: span 2 / -1` is invalid; the line form `2 / -1` is what was meant.
pub fn normalize_invalid_grid_placement(css: &str) -> String {
    GRID_SPAN_PLACEMENT
        .replace_all(css, |caps: &Captures| {
            format!(
                "{}: {} / {}{}",
                caps[1].to_ascii_lowercase(),
                &caps[2],
                caps[3].trim_end(),
                &caps[4]
            )
        })
        .into_owned()
}

pub fn normalize_alpha_to_percentage(alpha: &str) -> String {
    let value = alpha.trim();
    if value.is_empty() {
        return "100%".to_string();
    }
    if is_plain_percentage(value) {
        return value.to_string();
    }
    if let Some(mut number) = parse_number(value) {
        if number <= 1.0 {
            number *= 100.0;
        }
        let clamped = number.clamp(0.0, 100.0);
        return format!("{}%", trim_decimal(&format!("{:.4}", clamped)));
    }
    format!("calc({} * 100%)", value)
}

pub fn normalize_deprecated_hsl_references(css: &str) -> String {
    if !css.to_ascii_lowercase().contains("-hsl") {
        return css.to_string();
    }

    let css = HSL_FUNCTION_TOKEN.replace_all(css, |caps: &Captures| {
        let token = caps[1].to_ascii_lowercase();
        match caps.get(2) {
            Some(alpha) => format!(
                "color-mix(in oklab, var(--{}) {}, transparent)",
                token,
                normalize_alpha_to_percentage(alpha.as_str())
            ),
            None => format!("var(--{})", token),
        }
    });
    normalize_acss_deprecated_hsl_tokens(&css)
}

/// Utility stylesheets only ever use the bare `var(--x-hsl)` form.
pub fn normalize_acss_deprecated_hsl_tokens(css: &str) -> String {
    HSL_VAR_TOKEN
        .replace_all(css, |caps: &Captures| format!("var(--{})", caps[1].to_ascii_lowercase()))
        .into_owned()
}

pub fn normalize_css_variables(css: &str) -> String {
    if css.is_empty() {
        return String::new();
    }

    let css = GAP_IDENTIFIER
        .replace_all(css, |caps: &Captures| {
            let whole = caps.get(0).map(|m| m.start()).unwrap_or(0);
            if preceded_by_identifier(css, whole) {
                return caps[0].to_string();
            }
            let property = caps[1].to_ascii_lowercase();
            let value = caps[2].to_ascii_lowercase();
            if CSS_WIDE_KEYWORDS.contains(&value.as_str()) {
                format!("{}: {};", property, value)
            } else {
                String::new()
            }
        })
        .into_owned();

    let css = GAP_PAIR
        .replace_all(&css, |caps: &Captures| {
            let first = caps[1].to_ascii_lowercase();
            let second = caps[3].to_ascii_lowercase();
            let first_value = caps[2].trim();
            if first != second && first_value == caps[4].trim() {
                format!("gap: {};", first_value)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();

    let css = normalize_identical_shorthands(&css);
    let css = FR_CONTAINER_GAP.replace_all(&css, "var(--container-gap)");
    let css = FR_CARD_GAP.replace_all(&css, "var(--card-gap, var(--content-gap))");
    let css = FR_CARD_PADDING_DECL.replace_all(&css, "--card-padding:");
    let css = FR_CARD_PADDING_VAR.replace_all(&css, "var(--card-padding)");
    let css = css.replace("[class*=brxe-]", "");
    let css = FR_CLASS_PREFIX.replace_all(&css, ".$1");
    TRANSPARENCY_TOKEN
        .replace_all(&css, |caps: &Captures| {
            let percent = caps[2].parse::<u32>().unwrap_or(0).min(100);
            format!(
                "color-mix(in oklch, var(--{}) {}%, transparent)",
                caps[1].to_ascii_lowercase(),
                percent
            )
        })
        .into_owned()
}

/// Collapses four identical-family longhands inside every innermost rule body.
pub fn normalize_identical_shorthands(css: &str) -> String {
    if css.is_empty() {
        return String::new();
    }
    if !css.contains('{') && !css.contains('}') {
        return collapse_known_quad_shorthands(css);
    }
    RULE_BODY
        .replace_all(css, |caps: &Captures| {
            format!("{{{}}}", collapse_known_quad_shorthands(&caps[1]))
        })
        .into_owned()
}

pub fn collapse_known_quad_shorthands(decls: &str) -> String {
    QUAD_GROUPS
        .iter()
        .fold(decls.to_string(), |acc, (properties, shorthand)| {
            collapse_quad_shorthand(&acc, properties, shorthand)
        })
}

/// Replaces the four longhands (top, right, bottom, left order) with one
/// shorthand declaration. Leaves the text alone unless all four are present.
pub fn collapse_quad_shorthand(decls: &str, properties: &[&str; 4], shorthand: &str) -> String {
    let mut patterns = Vec::with_capacity(4);
    let mut values = Vec::with_capacity(4);
    for property in properties {
        let Ok(pattern) = Regex::new(&format!(
            r"(?i)(?:^|;)\s*{}\s*:\s*([^;{{}}]+)\s*;",
            regex::escape(property)
        )) else {
            return decls.to_string();
        };
        let Some(caps) = pattern.captures(decls) else {
            return decls.to_string();
        };
        values.push(caps[1].trim().to_string());
        patterns.push(pattern);
    }

    let value = build_quad_shorthand_value(&values[0], &values[1], &values[2], &values[3]);
    let mut remaining = decls.to_string();
    for pattern in &patterns {
        remaining = pattern.replace_all(&remaining, ";").into_owned();
    }

    let remaining = WHITESPACE_RUN.replace_all(&remaining, " ");
    let remaining = SEMICOLON_RUN.replace_all(remaining.trim_end(), ";");
    let mut remaining = remaining.trim().trim_start_matches(';').trim_start().to_string();
    if !remaining.is_empty() && !remaining.ends_with(';') {
        remaining.push(';');
    }

    format!("{} {}: {};", remaining, shorthand, value)
        .trim()
        .to_string()
}

pub fn build_quad_shorthand_value(top: &str, right: &str, bottom: &str, left: &str) -> String {
    if top == right && right == bottom && bottom == left {
        return top.to_string();
    }
    if top == bottom && right == left {
        return format!("{} {}", top, right);
    }
    if right == left {
        return format!("{} {} {}", top, right, bottom);
    }
    format!("{} {} {} {}", top, right, bottom, left)
}

pub fn normalize_border_width_value(value: &str) -> String {
    let trimmed = value.trim();
    if !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|ch| ch.is_ascii_digit() || ch == '.' || ch.is_whitespace())
    {
        return trimmed
            .split_whitespace()
            .map(normalize_border_width_component)
            .collect::<Vec<_>>()
            .join(" ");
    }
    normalize_border_width_component(trimmed)
}

/// Bare numbers gain `px`; a zero stays unitless.
pub fn normalize_border_width_component(component: &str) -> String {
    let component = component.trim();
    if component.is_empty() {
        return String::new();
    }
    if !is_plain_number(component) {
        return component.to_string();
    }
    if component
        .trim_start_matches('-')
        .chars()
        .all(|ch| ch == '0' || ch == '.')
    {
        return "0".to_string();
    }
    format!("{}px", component)
}

pub fn normalize_gradient_stop(stop: &str) -> String {
    let stop = stop.trim();
    if is_plain_number(stop) {
        return format!("{}%", stop);
    }
    stop.to_string()
}

pub fn normalize_content_property_value(value: &str) -> String {
    let content = value.trim();
    if content.is_empty() {
        return String::new();
    }

    let lowered = content.to_ascii_lowercase();
    if CONTENT_KEYWORDS.contains(&lowered.as_str()) {
        return lowered;
    }
    if CONTENT_FUNCTION.is_match(content) {
        return content.to_string();
    }
    if is_quoted(content) {
        return content.to_string();
    }

    let escaped = content.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Renames physical properties to their logical equivalents.
///
/// `@media` / `@container` preludes are left untouched, and so are custom
/// properties (`--my-width:`) and vendor-prefixed names.
pub fn convert_to_logical_properties(css: &str) -> String {
    let css = normalize_css_variables(css);
    let mut output = String::with_capacity(css.len());
    let mut cursor = 0;

    for (start, end) in at_rule_prelude_ranges(&css) {
        output.push_str(&rename_physical_properties(&css[cursor..start]));
        output.push_str(&css[start..end]);
        cursor = end;
    }
    output.push_str(&rename_physical_properties(&css[cursor..]));
    output
}

pub fn normalize_bricks_id_selectors_in_css(css: &str) -> String {
    BRICKS_ID_SELECTOR
        .replace_all(css, |caps: &Captures| format!("#etch-{}", &caps[1]))
        .into_owned()
}

/// Splits a selector list on commas that are not inside parentheses or brackets.
pub fn split_selector_by_comma_respecting_parens(selector: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for ch in selector.chars() {
        match ch {
            '(' | '[' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                let part = current.trim();
                if !part.is_empty() {
                    parts.push(part.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let part = current.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
    parts
}

pub fn clean_custom_css(css: &str) -> String {
    let css = css.replace("; ;", ";");
    let css = SEMICOLON_RUN.replace_all(&css, ";");
    css.trim().to_string()
}

fn rename_physical_properties(segment: &str) -> String {
    PHYSICAL_PROPERTY
        .replace_all(segment, |caps: &Captures| {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            if preceded_by_identifier(segment, start) {
                return caps[0].to_string();
            }
            match logical_property_name(&caps[1].to_ascii_lowercase()) {
                Some(logical) => format!("{}:", logical),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn logical_property_name(physical: &str) -> Option<&'static str> {
    let logical = match physical {
        "margin-top" => "margin-block-start",
        "margin-right" => "margin-inline-end",
        "margin-bottom" => "margin-block-end",
        "margin-left" => "margin-inline-start",
        "padding-top" => "padding-block-start",
        "padding-right" => "padding-inline-end",
        "padding-bottom" => "padding-block-end",
        "padding-left" => "padding-inline-start",
        "border-top" => "border-block-start",
        "border-right" => "border-inline-end",
        "border-bottom" => "border-block-end",
        "border-left" => "border-inline-start",
        "top" => "inset-block-start",
        "right" => "inset-inline-end",
        "bottom" => "inset-block-end",
        "left" => "inset-inline-start",
        "width" => "inline-size",
        "height" => "block-size",
        "min-width" => "min-inline-size",
        "min-height" => "min-block-size",
        "max-width" => "max-inline-size",
        "max-height" => "max-block-size",
        _ => return None,
    };
    Some(logical)
}

fn at_rule_prelude_ranges(css: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut search_from = 0;
    while let Some(rel) = css[search_from..].find('@') {
        let start = search_from + rel;
        let rest = &css[start..];
        let is_conditional = ["@media", "@container"]
            .iter()
            .any(|keyword| starts_with_ignore_case(rest, keyword));
        if !is_conditional {
            search_from = start + 1;
            continue;
        }
        let end = rest
            .find(['{', ';'])
            .map(|offset| start + offset)
            .unwrap_or(css.len());
        ranges.push((start, end));
        search_from = end;
    }
    ranges
}

/// Byte offset of the first whole-name occurrence of `token` (e.g. `.card`)
/// at or after `from`. Class names are case-sensitive and `.card-title`
/// does not match `.card`.
pub(crate) fn find_selector_token(text: &str, token: &str, from: usize) -> Option<usize> {
    if token.is_empty() {
        return None;
    }
    let mut search_from = from;

    while let Some(rel) = text.get(search_from..)?.find(token) {
        let start = search_from + rel;
        let end = start + token.len();
        if !text[end..].chars().next().is_some_and(is_identifier_char) {
            return Some(start);
        }
        search_from = end;
    }
    None
}

pub(crate) fn replace_selector_token(text: &str, token: &str, replacement: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(start) = find_selector_token(text, token, cursor) {
        output.push_str(&text[cursor..start]);
        output.push_str(replacement);
        cursor = start + token.len();
    }
    output.push_str(&text[cursor..]);
    output
}

pub(crate) fn preceded_by_identifier(text: &str, index: usize) -> bool {
    text[..index]
        .chars()
        .next_back()
        .is_some_and(is_identifier_char)
}

pub(crate) fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn is_plain_percentage(value: &str) -> bool {
    value
        .strip_suffix('%')
        .is_some_and(|number| is_plain_number(number) && !number.starts_with('-'))
}

pub(crate) fn is_plain_number(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    let mut parts = digits.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let fraction = parts.next();
    if whole.is_empty() || !whole.chars().all(|ch| ch.is_ascii_digit()) {
        return false;
    }
    match fraction {
        Some(fraction) => !fraction.is_empty() && fraction.chars().all(|ch| ch.is_ascii_digit()),
        None => true,
    }
}

fn parse_number(value: &str) -> Option<f64> {
    let parsed = value.parse::<f64>().ok()?;
    parsed.is_finite().then_some(parsed)
}

fn trim_decimal(formatted: &str) -> &str {
    if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted
    }
}

fn is_quoted(content: &str) -> bool {
    let mut chars = content.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => matches!(first, '"' | '\'') && first == last,
        _ => false,
    }
}
