use std::borrow::Borrow;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::constraint::is_email;
use crate::lint::SchemaIssue;
use crate::values::parse_date;

/// Opaque, stable identifier of a field within its form.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh random identifier for a newly created field.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FieldId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Constraints shared by single-line and multi-line text fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TextRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regular expression the value must contain a match for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// Options for radio and select fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ChoiceRules {
    /// Trimmed, blank entries dropped, both when built and when deserialized.
    #[serde(deserialize_with = "deserialize_options")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ChoiceRules {
    pub fn new<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: normalize_options(options.into_iter().map(Into::into)),
            default_value: None,
        }
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.options.iter().any(|option| option == candidate)
    }
}

fn normalize_options(options: impl IntoIterator<Item = String>) -> Vec<String> {
    options
        .into_iter()
        .map(|option| option.trim().to_string())
        .filter(|option| !option.is_empty())
        .collect()
}

fn deserialize_options<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer).map(normalize_options)
}

/// Derivation metadata: which fields feed the formula and the formula itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Derivation {
    pub parent_field_ids: Vec<FieldId>,
    pub formula: String,
}

impl Derivation {
    pub fn new<I, P>(parents: I, formula: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<FieldId>,
    {
        Self {
            parent_field_ids: parents.into_iter().map(Into::into).collect(),
            formula: formula.into(),
        }
    }

    /// Declared parents with duplicates removed, first occurrence wins.
    pub fn parents(&self) -> Vec<&FieldId> {
        let mut seen = Vec::with_capacity(self.parent_field_ids.len());
        for parent in &self.parent_field_ids {
            if !seen.contains(&parent) {
                seen.push(parent);
            }
        }
        seen
    }
}

/// Field kind together with the settings that are meaningful for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text(TextRules),
    Textarea(TextRules),
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<f64>,
    },
    Email {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<String>,
    },
    Checkbox {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<bool>,
    },
    Radio(ChoiceRules),
    Select(ChoiceRules),
    Date {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_value: Option<String>,
    },
    Derived(Derivation),
}

impl FieldKind {
    pub fn text() -> Self {
        FieldKind::Text(TextRules::default())
    }

    pub fn number() -> Self {
        FieldKind::Number {
            default_value: None,
        }
    }

    pub fn email() -> Self {
        FieldKind::Email {
            default_value: None,
        }
    }

    pub fn checkbox() -> Self {
        FieldKind::Checkbox {
            default_value: None,
        }
    }

    pub fn date() -> Self {
        FieldKind::Date {
            default_value: None,
        }
    }

    pub fn derived<I, P>(parents: I, formula: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<FieldId>,
    {
        FieldKind::Derived(Derivation::new(parents, formula))
    }

    /// The `type` tag used in serialized schemas.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text(_) => "text",
            FieldKind::Textarea(_) => "textarea",
            FieldKind::Number { .. } => "number",
            FieldKind::Email { .. } => "email",
            FieldKind::Checkbox { .. } => "checkbox",
            FieldKind::Radio(_) => "radio",
            FieldKind::Select(_) => "select",
            FieldKind::Date { .. } => "date",
            FieldKind::Derived(_) => "derived",
        }
    }

    pub fn text_rules(&self) -> Option<&TextRules> {
        match self {
            FieldKind::Text(rules) | FieldKind::Textarea(rules) => Some(rules),
            _ => None,
        }
    }

    pub fn choices(&self) -> Option<&ChoiceRules> {
        match self {
            FieldKind::Radio(rules) | FieldKind::Select(rules) => Some(rules),
            _ => None,
        }
    }

    pub fn derivation(&self) -> Option<&Derivation> {
        match self {
            FieldKind::Derived(derivation) => Some(derivation),
            _ => None,
        }
    }
}

/// One form field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSchema {
    pub id: FieldId,
    /// Display name. May be blank while the field is being edited.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSchema {
    /// Builds a field, cleaning up choice options and rejecting settings that
    /// contradict each other (inverted length bounds, a default that does not
    /// fit the kind, derivation without parents or formula).
    pub fn new(
        id: impl Into<FieldId>,
        label: impl Into<String>,
        kind: FieldKind,
    ) -> Result<Self, SchemaIssue> {
        let mut field = Self {
            id: id.into(),
            label: label.into(),
            required: false,
            placeholder: None,
            kind,
        };
        if let FieldKind::Radio(rules) | FieldKind::Select(rules) = &mut field.kind {
            rules.options = normalize_options(std::mem::take(&mut rules.options));
        }
        match field.shape_issues().into_iter().next() {
            Some(issue) => Err(issue),
            None => Ok(field),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, FieldKind::Derived(_))
    }

    /// Structural problems with this field's settings, independent of the
    /// rest of the form. Label emptiness is not checked here.
    pub fn shape_issues(&self) -> Vec<SchemaIssue> {
        let field = &self.id;
        let mut issues = Vec::new();

        match &self.kind {
            FieldKind::Text(rules) | FieldKind::Textarea(rules) => {
                if let (Some(min), Some(max)) = (rules.min_length, rules.max_length)
                    && min > max
                {
                    issues.push(SchemaIssue::InvertedBounds {
                        field: field.clone(),
                        min,
                        max,
                    });
                }
            }
            FieldKind::Radio(rules) | FieldKind::Select(rules) => {
                if rules.options.iter().all(|option| option.trim().is_empty()) {
                    issues.push(SchemaIssue::MissingOptions {
                        field: field.clone(),
                    });
                }
                for (index, option) in rules.options.iter().enumerate() {
                    if rules.options[..index].contains(option) {
                        issues.push(SchemaIssue::DuplicateOption {
                            field: field.clone(),
                            option: option.clone(),
                        });
                    }
                }
                if let Some(default) = &rules.default_value
                    && !rules.contains(default)
                {
                    issues.push(SchemaIssue::DefaultNotAnOption {
                        field: field.clone(),
                        value: default.clone(),
                    });
                }
            }
            FieldKind::Number { default_value } => {
                if let Some(value) = default_value
                    && !value.is_finite()
                {
                    issues.push(SchemaIssue::InvalidDefault {
                        field: field.clone(),
                        expected: "a finite number",
                    });
                }
            }
            FieldKind::Date { default_value } => {
                if let Some(value) = default_value
                    && !value.is_empty()
                    && parse_date(value).is_none()
                {
                    issues.push(SchemaIssue::InvalidDefault {
                        field: field.clone(),
                        expected: "a YYYY-MM-DD date",
                    });
                }
            }
            FieldKind::Derived(derivation) => {
                if derivation.parent_field_ids.is_empty() {
                    issues.push(SchemaIssue::MissingParents {
                        field: field.clone(),
                    });
                }
                if derivation.parent_field_ids.contains(field) {
                    issues.push(SchemaIssue::SelfParent {
                        field: field.clone(),
                    });
                }
                if derivation.formula.trim().is_empty() {
                    issues.push(SchemaIssue::BlankFormula {
                        field: field.clone(),
                    });
                }
            }
            FieldKind::Email { default_value } => {
                if let Some(value) = default_value
                    && !value.is_empty()
                    && !is_email(value)
                {
                    issues.push(SchemaIssue::InvalidDefault {
                        field: field.clone(),
                        expected: "an email address",
                    });
                }
            }
            FieldKind::Checkbox { .. } => {}
        }

        issues
    }
}
