use crate::settings::Settings;
use indexmap::IndexMap;
use regex::Regex;
use std::cell::OnceCell;
use std::sync::LazyLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointDefinition {
    pub key: String,
    pub kind: BreakpointKind,
    pub width_px: u32,
}

pub type BreakpointWidthMap = IndexMap<String, BreakpointDefinition>;

const DESKTOP: &str = "desktop";

const DEFAULT_BREAKPOINTS: &[(&str, BreakpointKind, u32)] = &[
    (DESKTOP, BreakpointKind::Min, 1200),
    ("tablet_landscape", BreakpointKind::Max, 1199),
    ("tablet_portrait", BreakpointKind::Max, 991),
    ("mobile_landscape", BreakpointKind::Max, 767),
    ("mobile_portrait", BreakpointKind::Max, 478),
];

static MIN_WIDTH_PX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(\s*min-width\s*:\s*(\d+(?:\.\d+)?)px\s*\)").expect("min-width pattern")
});
static MAX_WIDTH_PX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(\s*max-width\s*:\s*(\d+(?:\.\d+)?)px\s*\)").expect("max-width pattern")
});
static RANGE_PX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(\s*(width|inline-size|block-size)\s*(>=|<=|>|<)\s*(\d+(?:\.\d+)?)px\s*\)")
        .expect("range pattern")
});

/// Resolves named breakpoints to widths and media conditions.
///
/// The width map is computed lazily and memoized; call [`clear_cache`]
/// whenever the overrides change.
///
/// [`clear_cache`]: BreakpointResolver::clear_cache
#[derive(Debug, Default)]
pub struct BreakpointResolver {
    overrides: Vec<serde_json::Value>,
    width_map: OnceCell<BreakpointWidthMap>,
}

impl BreakpointResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: Vec<serde_json::Value>) -> Self {
        Self {
            overrides,
            width_map: OnceCell::new(),
        }
    }

    /// Accepts the stored option text: a JSON array, or a JSON object whose
    /// values are the override entries. Anything else yields no overrides.
    pub fn from_overrides_json(text: &str) -> Self {
        Self::with_overrides(parse_overrides_json(text))
    }

    pub fn set_overrides(&mut self, overrides: Vec<serde_json::Value>) {
        self.overrides = overrides;
        self.clear_cache();
    }

    pub fn clear_cache(&mut self) {
        self.width_map = OnceCell::new();
    }

    pub fn get_breakpoint_width_map(&self) -> &BreakpointWidthMap {
        self.width_map
            .get_or_init(|| build_width_map(&self.overrides))
    }

    pub fn get_breakpoint_media_query_map(&self, etch_syntax: bool) -> IndexMap<String, String> {
        self.get_breakpoint_width_map()
            .iter()
            .filter(|(_, definition)| definition.width_px > 0)
            .map(|(key, definition)| (key.clone(), media_condition(definition, etch_syntax)))
            .collect()
    }

    pub fn get_media_query_for_breakpoint(&self, key: &str) -> Option<String> {
        let key = sanitize_breakpoint_key(key);
        let definition = self.get_breakpoint_width_map().get(&key)?;
        if definition.width_px == 0 {
            return None;
        }
        Some(format!("@media {}", media_condition(definition, true)))
    }

    pub fn is_breakpoint(&self, key: &str) -> bool {
        let key = sanitize_breakpoint_key(key);
        !key.is_empty() && self.get_breakpoint_width_map().contains_key(&key)
    }

    /// Known breakpoint keys plus any breakpoint named by a `_cssCustom:<bp>` key.
    pub fn detect_breakpoint_keys(&self, settings: &Settings) -> Vec<String> {
        let mut keys: Vec<String> = self.get_breakpoint_width_map().keys().cloned().collect();
        for key in settings.keys() {
            let Some(suffix) = key.strip_prefix("_cssCustom:") else {
                continue;
            };
            let sanitized = sanitize_breakpoint_key(suffix);
            if !sanitized.is_empty() && !keys.contains(&sanitized) {
                keys.push(sanitized);
            }
        }
        keys
    }
}

pub fn sanitize_breakpoint_key(key: &str) -> String {
    key.chars()
        .map(|ch| ch.to_ascii_lowercase())
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '-'))
        .collect()
}

/// Rewrites px-based `min-width`, `max-width` and range conditions to the
/// `to-rem()` range form. Conditions already using `to-rem(` pass through.
pub fn normalize_media_condition_to_etch(condition: &str) -> String {
    if condition.contains("to-rem(") {
        return condition.to_string();
    }

    let converted = MIN_WIDTH_PX.replace_all(condition, "(width >= to-rem(${1}px))");
    let converted = MAX_WIDTH_PX.replace_all(&converted, "(width <= to-rem(${1}px))");
    let converted = RANGE_PX.replace_all(&converted, |caps: &regex::Captures| {
        format!(
            "({} {} to-rem({}px))",
            caps[1].to_ascii_lowercase(),
            &caps[2],
            &caps[3]
        )
    });
    converted.into_owned()
}

fn media_condition(definition: &BreakpointDefinition, etch_syntax: bool) -> String {
    match (definition.kind, etch_syntax) {
        (BreakpointKind::Min, true) => format!("(width >= to-rem({}px))", definition.width_px),
        (BreakpointKind::Max, true) => format!("(width <= to-rem({}px))", definition.width_px),
        (BreakpointKind::Min, false) => format!("(min-width: {}px)", definition.width_px),
        (BreakpointKind::Max, false) => format!("(max-width: {}px)", definition.width_px),
    }
}

/// Override entries from stored option text; unreadable text yields none.
pub fn parse_overrides_json(text: &str) -> Vec<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(serde_json::Value::Object(entries)) => entries.into_iter().map(|(_, value)| value).collect(),
        Ok(_) => Vec::new(),
        Err(err) => {
            debug!(error = %err, "ignoring unreadable breakpoint overrides");
            Vec::new()
        }
    }
}

fn build_width_map(overrides: &[serde_json::Value]) -> BreakpointWidthMap {
    let mut map: BreakpointWidthMap = DEFAULT_BREAKPOINTS
        .iter()
        .map(|(key, kind, width_px)| {
            (
                key.to_string(),
                BreakpointDefinition {
                    key: key.to_string(),
                    kind: *kind,
                    width_px: *width_px,
                },
            )
        })
        .collect();

    for item in overrides {
        let Some(entry) = item.as_object() else {
            continue;
        };
        let key = entry
            .get("key")
            .and_then(json_text)
            .map(|key| sanitize_breakpoint_key(&key))
            .unwrap_or_default();
        let width = entry.get("width").and_then(json_width).unwrap_or(0);
        if key.is_empty() || width == 0 {
            continue;
        }

        let is_base = entry.get("base").map(json_truthy).unwrap_or(false);
        if key == DESKTOP || is_base {
            map.insert(
                DESKTOP.to_string(),
                BreakpointDefinition {
                    key: DESKTOP.to_string(),
                    kind: BreakpointKind::Min,
                    width_px: width.saturating_add(1),
                },
            );
        } else {
            map.insert(
                key.clone(),
                BreakpointDefinition {
                    key,
                    kind: BreakpointKind::Max,
                    width_px: width,
                },
            );
        }
    }

    let desktop = map.shift_remove(DESKTOP);
    let mut rest: Vec<BreakpointDefinition> = map.into_values().collect();
    rest.sort_by(|a, b| b.width_px.cmp(&a.width_px));

    let mut sorted = BreakpointWidthMap::new();
    if let Some(desktop) = desktop {
        sorted.insert(DESKTOP.to_string(), desktop);
    }
    for definition in rest {
        sorted.insert(definition.key.clone(), definition);
    }
    sorted
}

fn json_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn json_width(value: &serde_json::Value) -> Option<u32> {
    let width = match value {
        serde_json::Value::Number(number) => number.as_f64()?,
        serde_json::Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if width < 1.0 {
        return None;
    }
    Some(width.trunc().min(u32::MAX as f64) as u32)
}

fn json_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(flag) => *flag,
        serde_json::Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(text) => !text.is_empty() && text != "0",
        serde_json::Value::Null => false,
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(entries) => !entries.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BreakpointKind, BreakpointResolver, normalize_media_condition_to_etch,
        sanitize_breakpoint_key,
    };
    use crate::settings::{Settings, Value};
    use serde_json::json;

    #[test]
    fn default_map_starts_with_desktop_min() {
        let resolver = BreakpointResolver::new();
        let map = resolver.get_breakpoint_width_map();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "desktop",
                "tablet_landscape",
                "tablet_portrait",
                "mobile_landscape",
                "mobile_portrait"
            ]
        );
        assert_eq!(map["desktop"].kind, BreakpointKind::Min);
        assert!(
            map.values()
                .skip(1)
                .all(|definition| definition.kind == BreakpointKind::Max)
        );
    }

    #[test]
    fn overrides_keep_descending_order_with_desktop_first() {
        let resolver = BreakpointResolver::with_overrides(vec![
            json!({"key": "tablet_portrait", "width": 991}),
            json!({"key": "Wide Screen", "width": 1600}),
            json!({"key": "tiny", "width": 320}),
        ]);
        let map = resolver.get_breakpoint_width_map();
        let mut iter = map.values();
        let first = iter.next().expect("desktop entry");
        assert_eq!(first.key, "desktop");
        assert_eq!(first.kind, BreakpointKind::Min);

        let widths: Vec<u32> = iter.map(|definition| definition.width_px).collect();
        assert!(widths.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(map["widescreen"].width_px, 1600);
        assert_eq!(map["tablet_portrait"].width_px, 991);
    }

    #[test]
    fn base_override_replaces_desktop_at_width_plus_one() {
        let resolver =
            BreakpointResolver::from_overrides_json(r#"[{"key":"laptop","width":1366,"base":true}]"#);
        let map = resolver.get_breakpoint_width_map();
        assert_eq!(map["desktop"].width_px, 1367);
        assert_eq!(map["desktop"].kind, BreakpointKind::Min);
        assert!(!map.contains_key("laptop"));
    }

    #[test]
    fn malformed_overrides_are_skipped() {
        let resolver = BreakpointResolver::with_overrides(vec![
            json!("tablet"),
            json!({"key": "", "width": 700}),
            json!({"key": "phone", "width": 0}),
            json!({"key": "phone"}),
            json!({"key": "phablet", "width": "600"}),
        ]);
        let map = resolver.get_breakpoint_width_map();
        assert!(!map.contains_key("phone"));
        assert_eq!(map["phablet"].width_px, 600);
        assert_eq!(map.len(), 6);

        let unreadable = BreakpointResolver::from_overrides_json("not json");
        assert_eq!(unreadable.get_breakpoint_width_map().len(), 5);
    }

    #[test]
    fn clear_cache_picks_up_new_overrides() {
        let mut resolver = BreakpointResolver::new();
        assert_eq!(resolver.get_breakpoint_width_map()["mobile_portrait"].width_px, 478);
        resolver.set_overrides(vec![json!({"key": "mobile_portrait", "width": 420})]);
        assert_eq!(resolver.get_breakpoint_width_map()["mobile_portrait"].width_px, 420);
    }

    #[test]
    fn media_query_map_supports_both_syntaxes() {
        let resolver = BreakpointResolver::new();
        let etch = resolver.get_breakpoint_media_query_map(true);
        assert_eq!(etch["tablet_portrait"], "(width <= to-rem(991px))");
        assert_eq!(etch["desktop"], "(width >= to-rem(1200px))");

        let legacy = resolver.get_breakpoint_media_query_map(false);
        assert_eq!(legacy["tablet_portrait"], "(max-width: 991px)");
        assert_eq!(legacy["desktop"], "(min-width: 1200px)");
    }

    #[test]
    fn media_query_for_named_breakpoint() {
        let resolver = BreakpointResolver::new();
        assert_eq!(
            resolver.get_media_query_for_breakpoint("mobile_portrait"),
            Some("@media (width <= to-rem(478px))".to_string())
        );
        assert_eq!(resolver.get_media_query_for_breakpoint("nonexistent"), None);
    }

    #[test]
    fn normalizes_px_conditions_to_to_rem() {
        assert_eq!(
            normalize_media_condition_to_etch("(min-width: 1200px)"),
            "(width >= to-rem(1200px))"
        );
        assert_eq!(
            normalize_media_condition_to_etch("(max-width: 767px)"),
            "(width <= to-rem(767px))"
        );
        assert_eq!(
            normalize_media_condition_to_etch("(width >= 1200px)"),
            "(width >= to-rem(1200px))"
        );
        assert_eq!(
            normalize_media_condition_to_etch("(inline-size >= 329px)"),
            "(inline-size >= to-rem(329px))"
        );
        assert_eq!(
            normalize_media_condition_to_etch("screen and (min-width:768px) and (max-width:1199.5px)"),
            "screen and (width >= to-rem(768px)) and (width <= to-rem(1199.5px))"
        );
    }

    #[test]
    fn media_condition_normalization_is_idempotent() {
        for input in [
            "(min-width: 1200px)",
            "(max-width:767px)",
            "(width < 500px)",
            "(min-width: 60em)",
            "print",
            "(width <= to-rem(767px))",
            "",
        ] {
            let once = normalize_media_condition_to_etch(input);
            assert_eq!(normalize_media_condition_to_etch(&once), once, "input: {input}");
        }
        assert_eq!(normalize_media_condition_to_etch("(min-width: 60em)"), "(min-width: 60em)");
    }

    #[test]
    fn detects_custom_css_breakpoint_keys() {
        let resolver = BreakpointResolver::new();
        let mut settings = Settings::new();
        settings.insert("_cssCustom:Foldable".to_string(), Value::Scalar("a".to_string()));
        settings.insert("_cssCustom:mobile_portrait".to_string(), Value::Scalar("b".to_string()));
        let keys = resolver.detect_breakpoint_keys(&settings);
        assert_eq!(keys.len(), 6);
        assert_eq!(keys.last().map(String::as_str), Some("foldable"));
    }

    #[test]
    fn sanitizes_keys() {
        assert_eq!(sanitize_breakpoint_key("Tablet Portrait!"), "tabletportrait");
        assert_eq!(sanitize_breakpoint_key("mobile_landscape"), "mobile_landscape");
    }
}
