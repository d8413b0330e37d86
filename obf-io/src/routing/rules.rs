//! Per-section encoding rules
//!
//! A routing section lists its `(tag, value)` pairs once; road records then
//! refer to them by 0-based position ("local id"). The semantic kind of each
//! rule is classified when the table is built so queries never compare tag
//! strings again.

use obf_common::units;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    OneWay,
    Roundabout,
    Lanes,
    Highway,
    Access,
    MaxSpeed,
    TrafficSignals,
    RailwayCrossing,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleValue {
    Int(i32),
    /// Speeds are stored in m/s.
    Float(f32),
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodingRule {
    pub local_id: u32,
    pub tag: String,
    pub value: String,
    pub kind: RuleKind,
    pub parsed: RuleValue,
}

impl EncodingRule {
    /// Normalize the value and classify the pair.
    pub fn new(local_id: u32, tag: impl Into<String>, value: impl Into<String>) -> Self {
        let tag = tag.into();
        let mut value = value.into();
        if value.eq_ignore_ascii_case("true") {
            value = "yes".into();
        } else if value.eq_ignore_ascii_case("false") {
            value = "no".into();
        }

        let (kind, parsed) = classify(&tag, &value);
        Self {
            local_id,
            tag,
            value,
            kind,
            parsed,
        }
    }

    pub fn int_value(&self) -> Option<i32> {
        match self.parsed {
            RuleValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn float_value(&self) -> Option<f32> {
        match self.parsed {
            RuleValue::Float(v) => Some(v),
            _ => None,
        }
    }
}

fn classify(tag: &str, value: &str) -> (RuleKind, RuleValue) {
    let tag_is = |name: &str| tag.eq_ignore_ascii_case(name);

    if tag_is("oneway") {
        let direction = match value {
            "-1" | "reverse" => -1,
            "1" | "yes" => 1,
            _ => 0,
        };
        return (RuleKind::OneWay, RuleValue::Int(direction));
    }
    if tag_is("highway") && value == "traffic_signals" {
        return (RuleKind::TrafficSignals, RuleValue::Text);
    }
    if tag_is("railway") && (value == "crossing" || value == "level_crossing") {
        return (RuleKind::RailwayCrossing, RuleValue::Text);
    }
    if (tag_is("roundabout") && !value.is_empty()) || (tag_is("junction") && value == "roundabout")
    {
        return (RuleKind::Roundabout, RuleValue::Text);
    }
    if tag_is("highway") && !value.is_empty() {
        return (RuleKind::Highway, RuleValue::Text);
    }
    let access_prefix = tag
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("access"));
    if access_prefix && !value.is_empty() {
        return (RuleKind::Access, RuleValue::Text);
    }
    if tag_is("maxspeed") && !value.is_empty() {
        let parsed = units::parse_speed(value)
            .map(|mps| RuleValue::Float(mps as f32))
            .unwrap_or(RuleValue::Float(-1.0));
        return (RuleKind::MaxSpeed, parsed);
    }
    if tag_is("lanes") && !value.is_empty() {
        let parsed = units::parse_int(value)
            .map(RuleValue::Int)
            .unwrap_or(RuleValue::Int(-1));
        return (RuleKind::Lanes, parsed);
    }
    (RuleKind::Other, RuleValue::Text)
}

/// A section's rules in file order; index = local id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingRuleTable {
    rules: Vec<EncodingRule>,
}

impl EncodingRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; its local id is its position.
    pub fn push(&mut self, tag: impl Into<String>, value: impl Into<String>) -> u32 {
        let local_id = self.rules.len() as u32;
        self.rules.push(EncodingRule::new(local_id, tag, value));
        local_id
    }

    pub fn get(&self, local_id: u32) -> Option<&EncodingRule> {
        self.rules.get(local_id as usize)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodingRule> {
        self.rules.iter()
    }

    /// First rule of `kind` among `types`, in road order.
    pub fn first_of_kind(&self, types: &[u32], kind: RuleKind) -> Option<&EncodingRule> {
        types
            .iter()
            .filter_map(|t| self.get(*t))
            .find(|rule| rule.kind == kind)
    }

    pub fn has_kind(&self, types: &[u32], kind: RuleKind) -> bool {
        self.first_of_kind(types, kind).is_some()
    }

    pub fn find(&self, tag: &str, value: &str) -> Option<u32> {
        self.rules
            .iter()
            .find(|r| r.tag == tag && r.value == value)
            .map(|r| r.local_id)
    }
}
