use crate::breakpoints::{BreakpointResolver, sanitize_breakpoint_key};
use crate::normalizer::{
    build_quad_shorthand_value, normalize_border_width_component, normalize_border_width_value,
    normalize_content_property_value, normalize_gradient_stop, replace_selector_token,
    split_selector_by_comma_respecting_parens,
};
use crate::settings::{Settings, Value, non_empty, present, text};
use indexmap::IndexMap;
use std::collections::HashSet;

const SIDES: [&str; 4] = ["top", "right", "bottom", "left"];

const TYPOGRAPHY_PROPERTIES: &[(&str, &str)] = &[
    ("font-size", "fontSize"),
    ("font-weight", "fontWeight"),
    ("font-family", "fontFamily"),
    ("font-style", "fontStyle"),
    ("line-height", "lineHeight"),
    ("letter-spacing", "letterSpacing"),
    ("word-spacing", "wordSpacing"),
    ("text-align", "textAlign"),
    ("text-transform", "textTransform"),
    ("text-decoration", "textDecoration"),
    ("text-indent", "textIndent"),
];

const TRAILING_TYPOGRAPHY_PROPERTIES: &[(&str, &str)] = &[
    ("vertical-align", "verticalAlign"),
    ("white-space", "whiteSpace"),
];

const TRANSFORM_PARTS: &[(&str, &str)] = &[
    ("translateX", "px"),
    ("translateY", "px"),
    ("scaleX", ""),
    ("scaleY", ""),
    ("rotateX", "deg"),
    ("rotateY", "deg"),
    ("rotateZ", "deg"),
    ("skewX", "deg"),
    ("skewY", "deg"),
];

const FILTER_PARTS: &[(&str, &str)] = &[
    ("blur", "px"),
    ("brightness", "%"),
    ("contrast", "%"),
    ("hue-rotate", "deg"),
    ("invert", "%"),
    ("opacity", "%"),
    ("saturate", "%"),
    ("sepia", "%"),
];

const PLAIN_EFFECTS: &[(&str, &str)] = &[
    ("_textShadow", "text-shadow"),
    ("_objectFit", "object-fit"),
    ("_objectPosition", "object-position"),
    ("_isolation", "isolation"),
    ("_cursor", "cursor"),
    ("_mixBlendMode", "mix-blend-mode"),
    ("_pointerEvents", "pointer-events"),
    ("_scrollSnapType", "scroll-snap-type"),
    ("_scrollSnapAlign", "scroll-snap-align"),
    ("_scrollSnapStop", "scroll-snap-stop"),
];

/// Compiles builder settings into CSS declarations.
///
/// Pure over its inputs; the resolver is only consulted for breakpoint
/// names and media conditions.
#[derive(Debug, Clone, Copy)]
pub struct SettingsConverter<'a> {
    breakpoints: &'a BreakpointResolver,
}

impl<'a> SettingsConverter<'a> {
    pub fn new(breakpoints: &'a BreakpointResolver) -> Self {
        Self { breakpoints }
    }

    pub fn convert(&self, settings: &Settings, class_name: Option<&str>, include_variants: bool) -> String {
        let mut css = Vec::new();

        if let Some(content) = settings.get("_content").and_then(Value::as_scalar) {
            let content = normalize_content_property_value(content);
            if !content.is_empty() {
                css.push(format!("content: {};", content));
            }
        }

        css.extend(convert_layout(settings));
        css.extend(convert_flexbox(settings));
        css.extend(convert_grid(settings));
        css.extend(convert_sizing(settings));

        if let Some(background) = non_empty(settings, "_background").or_else(|| non_empty(settings, "background")) {
            css.extend(convert_background(background));
        }
        if let Some(gradient) = non_empty(settings, "_gradient") {
            css.extend(convert_gradient(gradient));
        }
        if let Some(border) = non_empty(settings, "_border").or_else(|| non_empty(settings, "border")) {
            css.extend(convert_border(border));
        }
        if let Some(typography) = non_empty(settings, "_typography").or_else(|| non_empty(settings, "typography")) {
            css.extend(convert_typography(typography));
        }
        if let Some(spacing) = non_empty(settings, "spacing") {
            css.extend(convert_spacing(spacing));
        }

        css.extend(convert_margin_padding(settings));
        css.extend(convert_position(settings));
        css.extend(convert_effects(settings));
        css.retain(|declaration| !declaration.is_empty());

        if include_variants {
            let variants = self.convert_selector_variants(settings, class_name);
            if !variants.is_empty() {
                css.push(variants);
            }
        }

        css.join(" ")
    }

    /// Wraps every `key:<breakpoint>` bucket in its media block, in breakpoint order.
    pub fn convert_responsive_variants(&self, settings: &Settings, class_name: Option<&str>) -> String {
        let queries = self.breakpoints.get_breakpoint_media_query_map(true);
        if queries.is_empty() {
            return String::new();
        }

        let mut buckets: IndexMap<String, Settings> = IndexMap::new();
        for (key, value) in settings {
            let Some((base_key, suffix)) = key.rsplit_once(':') else {
                continue;
            };
            let breakpoint = sanitize_breakpoint_key(suffix);
            if breakpoint.is_empty() || !queries.contains_key(&breakpoint) || base_key.is_empty() {
                continue;
            }
            buckets
                .entry(breakpoint)
                .or_default()
                .insert(base_key.to_string(), value.clone());
        }

        let mut responsive = String::new();
        for (breakpoint, query) in &queries {
            let Some(bucket) = buckets.get(breakpoint) else {
                continue;
            };
            let css = self.convert(bucket, class_name, true);
            let css = css.trim();
            if css.is_empty() {
                continue;
            }
            responsive.push_str(&format!("\n@media {} {{\n{}\n}}", query, indent_declarations(css)));
        }
        responsive
    }

    /// Emits nested `&<suffix> { ... }` blocks for state and pseudo-element keys.
    pub fn convert_selector_variants(&self, settings: &Settings, class_name: Option<&str>) -> String {
        let breakpoints: HashSet<String> = self
            .breakpoints
            .detect_breakpoint_keys(settings)
            .iter()
            .map(|key| sanitize_breakpoint_key(key))
            .filter(|key| !key.is_empty())
            .collect();

        let mut variants: IndexMap<String, Settings> = IndexMap::new();
        for (key, value) in settings {
            if key.starts_with("_cssCustom:") {
                continue;
            }
            let Some(separator) = key.find(':') else {
                continue;
            };
            let (base_key, suffix) = key.split_at(separator);
            if base_key.is_empty() {
                continue;
            }
            let last_segment = suffix.rsplit(':').next().unwrap_or("");
            if breakpoints.contains(&sanitize_breakpoint_key(last_segment)) {
                continue;
            }
            variants
                .entry(suffix.to_string())
                .or_default()
                .insert(base_key.to_string(), value.clone());
        }

        let mut chunks = Vec::new();
        for (suffix, values) in &variants {
            let css = self.convert(values, class_name, false);
            let css = css.trim();
            if css.is_empty() {
                continue;
            }
            let selector = normalize_variant_selector_suffix(suffix, class_name);
            if selector.is_empty() {
                continue;
            }
            chunks.push(format!("{} {{\n  {}\n}}", selector, css));
        }
        chunks.join("\n\n")
    }
}

pub fn normalize_variant_selector_suffix(suffix: &str, class_name: Option<&str>) -> String {
    let trimmed = suffix.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if let Some(class_name) = class_name.filter(|name| !name.is_empty()) {
        return normalize_selector_suffix_with_ampersand(suffix, class_name);
    }
    if trimmed.starts_with('&') {
        return trimmed.to_string();
    }
    if let Some(combinator) = leading_combinator(trimmed) {
        return combinator;
    }
    if trimmed.starts_with(['.', '#']) {
        return format!("& {}", trimmed);
    }
    format!("&{}", trimmed)
}

/// Rewrites a selector tail that followed `.class_name` into nesting syntax.
///
/// Leading whitespace in `raw` marks a descendant context, so `.a .b`
/// becomes `& .b` while `.a.b` becomes `&.b`.
pub fn normalize_selector_suffix_with_ampersand(raw: &str, class_name: &str) -> String {
    let suffix = raw.trim();
    if suffix.is_empty() {
        return String::new();
    }
    let descendant = raw.starts_with(char::is_whitespace);
    let suffix = replace_selector_token(suffix, &format!(".{}", class_name), "&");

    let parts: Vec<String> = split_selector_by_comma_respecting_parens(&suffix)
        .into_iter()
        .map(|part| {
            if part.starts_with('&') {
                part
            } else if let Some(combinator) = leading_combinator(&part) {
                combinator
            } else if part.starts_with('[') {
                format!("&{}", part)
            } else if part.starts_with(['.', '#']) {
                if descendant {
                    format!("& {}", part)
                } else {
                    format!("&{}", part)
                }
            } else {
                format!("&{}", part)
            }
        })
        .collect();
    parts.join(", ")
}

fn leading_combinator(part: &str) -> Option<String> {
    let combinator = part.chars().next().filter(|ch| matches!(ch, '>' | '+' | '~'))?;
    let rest = part[combinator.len_utf8()..].trim_start();
    if rest.is_empty() {
        return Some(format!("& {}", combinator));
    }
    Some(format!("& {} {}", combinator, rest))
}

fn indent_declarations(css: &str) -> String {
    css.replace("; ", ";\n")
        .lines()
        .map(|line| format!("  {}", line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_text(css: &mut Vec<String>, settings: &Settings, key: &str, property: &str) {
    if let Some(value) = text(settings, key) {
        css.push(format!("{}: {};", property, value));
    }
}

fn push_present(css: &mut Vec<String>, settings: &Settings, key: &str, property: &str) -> bool {
    match present(settings, key) {
        Some(value) => {
            css.push(format!("{}: {};", property, value));
            true
        }
        None => false,
    }
}

pub fn convert_layout(settings: &Settings) -> Vec<String> {
    let mut css = Vec::new();
    push_text(&mut css, settings, "_display", "display");
    push_text(&mut css, settings, "_overflow", "overflow");
    push_text(&mut css, settings, "_overflowX", "overflow-x");
    push_text(&mut css, settings, "_overflowY", "overflow-y");
    push_text(&mut css, settings, "_visibility", "visibility");
    push_present(&mut css, settings, "_opacity", "opacity");
    push_present(&mut css, settings, "_zIndex", "z-index");
    css
}

/// Flex container keys without an explicit `_display` imply the source
/// builder's default container: `display: flex` in a column.
pub fn convert_flexbox(settings: &Settings) -> Vec<String> {
    let mut css = Vec::new();
    let mut has_container_property = false;
    let has_display = text(settings, "_display").is_some();

    let direction = text(settings, "_flexDirection").or_else(|| text(settings, "_direction"));
    if let Some(direction) = direction {
        css.push(format!("flex-direction: {};", direction));
        has_container_property = true;
    }
    for (key, property) in [
        ("_flexWrap", "flex-wrap"),
        ("_justifyContent", "justify-content"),
        ("_alignItems", "align-items"),
        ("_alignContent", "align-content"),
    ] {
        if let Some(value) = text(settings, key) {
            css.push(format!("{}: {};", property, value));
            has_container_property = true;
        }
    }
    for (key, property) in [("_rowGap", "row-gap"), ("_columnGap", "column-gap"), ("_gap", "gap")] {
        has_container_property |= push_present(&mut css, settings, key, property);
    }

    if has_container_property && !has_display {
        let mut injected = vec!["display: flex;".to_string()];
        if direction.is_none() {
            injected.push("flex-direction: column;".to_string());
        }
        injected.append(&mut css);
        css = injected;
    }

    push_present(&mut css, settings, "_flexGrow", "flex-grow");
    push_present(&mut css, settings, "_flexShrink", "flex-shrink");
    push_text(&mut css, settings, "_flexBasis", "flex-basis");
    push_text(&mut css, settings, "_alignSelf", "align-self");
    push_present(&mut css, settings, "_order", "order");
    css
}

pub fn convert_grid(settings: &Settings) -> Vec<String> {
    let mut css = Vec::new();
    push_text(&mut css, settings, "_gridTemplateColumns", "grid-template-columns");
    push_text(&mut css, settings, "_gridTemplateRows", "grid-template-rows");
    push_present(&mut css, settings, "_gridGap", "gap");
    push_present(&mut css, settings, "_gridColumnGap", "column-gap");
    push_present(&mut css, settings, "_gridRowGap", "row-gap");
    push_text(&mut css, settings, "_justifyContentGrid", "justify-content");
    push_text(&mut css, settings, "_alignItemsGrid", "align-items");
    push_text(&mut css, settings, "_justifyItemsGrid", "justify-items");
    push_text(&mut css, settings, "_alignContentGrid", "align-content");
    push_text(&mut css, settings, "_gridAutoFlow", "grid-auto-flow");
    css.extend(grid_item_placement(settings, "Column", "grid-column"));
    css.extend(grid_item_placement(settings, "Row", "grid-row"));
    css
}

/// Explicit start/end lines win over span. A span of `1` is emitted as line
/// `1`, and a non-numeric span names a grid area.
fn grid_item_placement(settings: &Settings, axis: &str, property: &str) -> Vec<String> {
    let mut css = Vec::new();
    let start = text(settings, &format!("_gridItem{}Start", axis));
    let end = text(settings, &format!("_gridItem{}End", axis));

    if start.is_some() || end.is_some() {
        if let Some(start) = start {
            css.push(format!("{}-start: {};", property, start));
        }
        if let Some(end) = end {
            css.push(format!("{}-end: {};", property, end));
        }
        return css;
    }

    let Some(span) = text(settings, &format!("_gridItem{}Span", axis)) else {
        return css;
    };
    match span.trim().parse::<f64>() {
        Err(_) => css.push(format!("{}: {};", property, span)),
        Ok(number) if number.trunc() == 1.0 => css.push(format!("{}: 1;", property)),
        Ok(_) => css.push(format!("{}: span {};", property, span)),
    }
    css
}

pub fn convert_sizing(settings: &Settings) -> Vec<String> {
    let mut css = Vec::new();

    if let Some(width) = text(settings, "_width") {
        let display = text(settings, "_display").unwrap_or("").to_ascii_lowercase();
        let is_container = matches!(display.as_str(), "flex" | "grid" | "inline-flex" | "inline-grid");
        if is_container && width == "100%" {
            css.push("max-inline-size: 100%;".to_string());
        } else {
            css.push(format!("inline-size: {};", width));
        }
    }
    push_text(&mut css, settings, "_height", "block-size");

    for (primary, alias, property) in [
        ("_minWidth", "_widthMin", "min-inline-size"),
        ("_minHeight", "_heightMin", "min-block-size"),
        ("_maxWidth", "_widthMax", "max-inline-size"),
        ("_maxHeight", "_heightMax", "max-block-size"),
    ] {
        if let Some(value) = text(settings, primary).or_else(|| text(settings, alias)) {
            css.push(format!("{}: {};", property, value));
        }
    }
    push_text(&mut css, settings, "_aspectRatio", "aspect-ratio");
    css
}

pub fn convert_background(background: &Value) -> Vec<String> {
    let mut css = Vec::new();
    if let Some(color) = background.get("color").and_then(Value::color) {
        css.push(format!("background-color: {};", color));
    }

    let Some(image) = background.get("image") else {
        return css;
    };
    let Some(url) = image.get("url").and_then(Value::text) else {
        return css;
    };
    css.push(format!("background-image: url({});", url));
    for (key, property) in [
        ("size", "background-size"),
        ("position", "background-position"),
        ("repeat", "background-repeat"),
    ] {
        if let Some(value) = image.get(key).and_then(Value::text) {
            css.push(format!("{}: {};", property, value));
        }
    }
    css
}

pub fn convert_gradient(gradient: &Value) -> Option<String> {
    let colors = gradient.get("colors")?.as_list()?;
    let stops: Vec<String> = colors
        .iter()
        .filter_map(|entry| {
            let color = entry.get("color").and_then(Value::color)?;
            match entry.get("stop").and_then(Value::text) {
                Some(stop) => Some(format!("{} {}", color, normalize_gradient_stop(stop))),
                None => Some(color.to_string()),
            }
        })
        .collect();
    if stops.is_empty() {
        return None;
    }

    let function = match gradient.get("type").and_then(Value::as_scalar) {
        Some("radial") => "radial-gradient",
        _ => "linear-gradient",
    };
    Some(format!("background-image: {}({});", function, stops.join(", ")))
}

pub fn convert_border(border: &Value) -> Vec<String> {
    let mut css = Vec::new();

    match border.get("width") {
        Some(Value::Scalar(width)) if !width.is_empty() && width != "0" => {
            css.push(format!("border-width: {};", normalize_border_width_value(width)));
        }
        Some(width @ Value::Map(_)) if !width.is_empty() => {
            let [top, right, bottom, left] =
                SIDES.map(|side| normalize_border_width_component(side_or_zero(width, side)));
            css.push(format!(
                "border-width: {};",
                build_quad_shorthand_value(&top, &right, &bottom, &left)
            ));
        }
        _ => {}
    }

    if let Some(style) = border.get("style").and_then(Value::text) {
        css.push(format!("border-style: {};", style));
    }
    if let Some(color) = border.get("color").and_then(Value::color) {
        css.push(format!("border-color: {};", color));
    }

    match border.get("radius") {
        Some(Value::Scalar(radius)) if !radius.is_empty() && radius != "0" => {
            css.push(format!("border-radius: {};", radius));
        }
        Some(radius @ Value::Map(_)) if !radius.is_empty() => {
            let [top, right, bottom, left] = SIDES.map(|side| side_or_zero(radius, side));
            css.push(format!(
                "border-radius: {};",
                build_quad_shorthand_value(top, right, bottom, left)
            ));
        }
        _ => {}
    }
    css
}

fn side_or_zero<'v>(value: &'v Value, side: &str) -> &'v str {
    value.get(side).and_then(Value::present).unwrap_or("0")
}

pub fn convert_typography(typography: &Value) -> Vec<String> {
    let mut css = Vec::new();
    let lookup = |kebab: &str, camel: &str| -> Option<String> {
        typography
            .get(kebab)
            .and_then(Value::text)
            .or_else(|| typography.get(camel).and_then(Value::text))
            .map(str::to_string)
    };

    for (kebab, camel) in TYPOGRAPHY_PROPERTIES {
        if let Some(value) = lookup(kebab, camel) {
            css.push(format!("{}: {};", kebab, value));
        }
    }
    if let Some(color) = typography.get("color").and_then(Value::color) {
        css.push(format!("color: {};", color));
    }
    for (kebab, camel) in TRAILING_TYPOGRAPHY_PROPERTIES {
        if let Some(value) = lookup(kebab, camel) {
            css.push(format!("{}: {};", kebab, value));
        }
    }
    css
}

/// Legacy flat spacing object with pre-built `margin` / `padding` strings.
pub fn convert_spacing(spacing: &Value) -> Vec<String> {
    ["margin", "padding"]
        .into_iter()
        .filter_map(|property| {
            spacing
                .get(property)
                .and_then(Value::text)
                .map(|value| format!("{}: {};", property, value))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuadValues {
    pub direct: Option<String>,
    pub top: Option<String>,
    pub right: Option<String>,
    pub bottom: Option<String>,
    pub left: Option<String>,
    /// Every side came from the compound object; no side key overrode it.
    pub from_compound: bool,
}

impl QuadValues {
    fn side_mut(&mut self, side: &str) -> Option<&mut Option<String>> {
        match side {
            "top" => Some(&mut self.top),
            "right" => Some(&mut self.right),
            "bottom" => Some(&mut self.bottom),
            "left" => Some(&mut self.left),
            _ => None,
        }
    }

    fn has_all_sides(&self) -> bool {
        self.top.is_some() && self.right.is_some() && self.bottom.is_some() && self.left.is_some()
    }
}

/// Reads a compound quad (`_margin` object or shorthand string) and the
/// per-side keys. Per-side keys always win over the compound object.
pub fn extract_quad_values(settings: &Settings, compound_key: Option<&str>, side_keys: [&str; 4]) -> QuadValues {
    let mut values = QuadValues::default();

    if let Some(compound) = compound_key.and_then(|key| settings.get(key)) {
        match compound {
            Value::Map(_) => {
                for side in SIDES {
                    let side_value = compound.get(side).and_then(Value::present).map(str::to_string);
                    if let (Some(slot), Some(side_value)) = (values.side_mut(side), side_value) {
                        *slot = Some(side_value);
                    }
                }
                values.from_compound = values.has_all_sides();
            }
            Value::Scalar(direct) if !direct.is_empty() => {
                values.direct = Some(direct.clone());
            }
            _ => {}
        }
    }

    for (side, key) in SIDES.into_iter().zip(side_keys) {
        if let Some(side_value) = present(settings, key) {
            if let Some(slot) = values.side_mut(side) {
                *slot = Some(side_value.to_string());
                values.from_compound = false;
            }
        }
    }
    values
}

/// Shortest logical form for per-side values: `prop-block` / `prop-inline`
/// when an axis matches, longhands otherwise. A complete compound value keeps
/// the single `prop: T R B L` shorthand.
pub fn build_logical_quad_declarations(property: &str, values: &QuadValues) -> Vec<String> {
    let mut css = Vec::new();

    if let Some(direct) = &values.direct {
        css.push(format!("{}: {};", property, direct));
    }

    if values.from_compound && values.has_all_sides() {
        let (top, right, bottom, left) = (
            values.top.as_deref().unwrap_or_default(),
            values.right.as_deref().unwrap_or_default(),
            values.bottom.as_deref().unwrap_or_default(),
            values.left.as_deref().unwrap_or_default(),
        );
        css.push(format!(
            "{}: {};",
            property,
            build_quad_shorthand_value(top, right, bottom, left)
        ));
        return css;
    }

    match (&values.top, &values.bottom) {
        (Some(top), Some(bottom)) if top == bottom => css.push(format!("{}-block: {};", property, top)),
        (top, bottom) => {
            if let Some(top) = top {
                css.push(format!("{}-block-start: {};", property, top));
            }
            if let Some(bottom) = bottom {
                css.push(format!("{}-block-end: {};", property, bottom));
            }
        }
    }

    match (&values.right, &values.left) {
        (Some(right), Some(left)) if right == left => css.push(format!("{}-inline: {};", property, right)),
        (right, left) => {
            if let Some(right) = right {
                css.push(format!("{}-inline-end: {};", property, right));
            }
            if let Some(left) = left {
                css.push(format!("{}-inline-start: {};", property, left));
            }
        }
    }
    css
}

pub fn convert_margin_padding(settings: &Settings) -> Vec<String> {
    let margin = extract_quad_values(
        settings,
        Some("_margin"),
        ["_marginTop", "_marginRight", "_marginBottom", "_marginLeft"],
    );
    let padding = extract_quad_values(
        settings,
        Some("_padding"),
        ["_paddingTop", "_paddingRight", "_paddingBottom", "_paddingLeft"],
    );

    let mut css = build_logical_quad_declarations("margin", &margin);
    css.extend(build_logical_quad_declarations("padding", &padding));
    css
}

pub fn convert_position(settings: &Settings) -> Vec<String> {
    let mut css = Vec::new();
    push_text(&mut css, settings, "_position", "position");
    let inset = extract_quad_values(settings, None, ["_top", "_right", "_bottom", "_left"]);
    css.extend(build_logical_quad_declarations("inset", &inset));
    css
}

pub fn convert_effects(settings: &Settings) -> Vec<String> {
    let mut css = Vec::new();

    match non_empty(settings, "_transform") {
        Some(Value::Scalar(transform)) => css.push(format!("transform: {};", transform)),
        Some(transform @ Value::Map(_)) => {
            let parts = function_list(transform, TRANSFORM_PARTS, Value::text);
            if !parts.is_empty() {
                css.push(format!("transform: {};", parts.join(" ")));
            }
        }
        _ => {}
    }
    push_text(&mut css, settings, "_transformOrigin", "transform-origin");
    push_text(&mut css, settings, "_transition", "transition");
    push_text(&mut css, settings, "_cssTransition", "transition");

    if let Some(filters @ Value::Map(_)) = non_empty(settings, "_cssFilters") {
        let parts = function_list(filters, FILTER_PARTS, Value::present);
        if !parts.is_empty() {
            css.push(format!("filter: {};", parts.join(" ")));
        }
    }
    push_text(&mut css, settings, "_filter", "filter");
    push_text(&mut css, settings, "_backdropFilter", "backdrop-filter");

    match non_empty(settings, "_boxShadow") {
        Some(Value::Scalar(shadow)) => css.push(format!("box-shadow: {};", shadow)),
        Some(shadow @ Value::Map(_)) => {
            if let Some(declaration) = structured_box_shadow(shadow) {
                css.push(declaration);
            }
        }
        _ => {}
    }

    for (key, property) in PLAIN_EFFECTS {
        push_text(&mut css, settings, key, property);
    }
    css
}

fn function_list<'v>(
    source: &'v Value,
    parts: &[(&str, &str)],
    read: fn(&'v Value) -> Option<&'v str>,
) -> Vec<String> {
    parts
        .iter()
        .filter_map(|(name, unit)| {
            source
                .get(name)
                .and_then(read)
                .map(|value| format!("{}({}{})", name, value, unit))
        })
        .collect()
}

fn structured_box_shadow(shadow: &Value) -> Option<String> {
    let values = shadow.get("values").filter(|values| !values.is_empty())?;
    let read = |key: &str| values.get(key).and_then(Value::present).unwrap_or("0");
    let color = shadow.get("color").and_then(Value::color).unwrap_or("");
    let inset = if shadow.get("inset").is_some_and(Value::is_truthy) {
        "inset "
    } else {
        ""
    };
    let declaration = format!(
        "box-shadow: {}{}px {}px {}px {}px {}",
        inset,
        read("offsetX"),
        read("offsetY"),
        read("blur"),
        read("spread"),
        color
    );
    Some(format!("{};", declaration.trim_end()))
}
