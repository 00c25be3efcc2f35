//! Structural validation of generated content.
//!
//! Each [`TaskKind`](crate::job::TaskKind) declares a required shape:
//! required fields, minimum lengths for free-text fields, minimum counts
//! for list fields and enumerated sets for categorical fields. Validation
//! is structural and value-range based, never semantic. Violations carry a
//! path and a reason so the executor can replay them into a corrective
//! follow-up request.

use serde_json::Value;

use crate::job::TaskKind;

/// A single constraint on one field of a content payload.
#[derive(Debug, Clone, Copy)]
pub enum FieldRule {
    /// Field must exist and be non-null.
    Required,
    /// String field must have at least this many characters.
    MinLength(usize),
    /// Array field must have at least this many elements.
    MinItems(usize),
    /// String field must be one of the listed values.
    OneOf(&'static [&'static str]),
}

/// Constraints for one top-level field.
#[derive(Debug, Clone, Copy)]
pub struct ShapeField {
    pub path: &'static str,
    pub rules: &'static [FieldRule],
}

/// The declared shape of one content kind.
#[derive(Debug, Clone, Copy)]
pub struct ContentShape {
    pub name: &'static str,
    pub fields: &'static [ShapeField],
}

/// One validation failure, reported with enough context to be replayed as
/// corrective feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub reason: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

pub const DEPTH_VALUES: &[&str] = &["introductory", "intermediate", "advanced"];

const OUTLINE_SHAPE: ContentShape = ContentShape {
    name: "outline",
    fields: &[
        ShapeField {
            path: "title",
            rules: &[FieldRule::Required, FieldRule::MinLength(4)],
        },
        ShapeField {
            path: "summary",
            rules: &[FieldRule::Required, FieldRule::MinLength(40)],
        },
        ShapeField {
            path: "depth",
            rules: &[FieldRule::Required, FieldRule::OneOf(DEPTH_VALUES)],
        },
        ShapeField {
            path: "modules",
            rules: &[FieldRule::Required, FieldRule::MinItems(1)],
        },
    ],
};

const MODULE_SHAPE: ContentShape = ContentShape {
    name: "module",
    fields: &[
        ShapeField {
            path: "title",
            rules: &[FieldRule::Required, FieldRule::MinLength(4)],
        },
        ShapeField {
            path: "overview",
            rules: &[FieldRule::Required, FieldRule::MinLength(40)],
        },
        ShapeField {
            path: "objectives",
            rules: &[FieldRule::Required, FieldRule::MinItems(2)],
        },
    ],
};

const LESSON_SHAPE: ContentShape = ContentShape {
    name: "lesson",
    fields: &[
        ShapeField {
            path: "title",
            rules: &[FieldRule::Required, FieldRule::MinLength(4)],
        },
        ShapeField {
            path: "body",
            rules: &[FieldRule::Required, FieldRule::MinLength(200)],
        },
        ShapeField {
            path: "key_points",
            rules: &[FieldRule::Required, FieldRule::MinItems(2)],
        },
    ],
};

const ASSESSMENT_SHAPE: ContentShape = ContentShape {
    name: "assessment",
    fields: &[
        ShapeField {
            path: "title",
            rules: &[FieldRule::Required, FieldRule::MinLength(4)],
        },
        ShapeField {
            path: "questions",
            rules: &[FieldRule::Required, FieldRule::MinItems(3)],
        },
    ],
};

/// The declared shape for a task kind.
pub fn shape_for(kind: &TaskKind) -> &'static ContentShape {
    match kind {
        TaskKind::Outline => &OUTLINE_SHAPE,
        TaskKind::Module { .. } => &MODULE_SHAPE,
        TaskKind::Lesson { .. } => &LESSON_SHAPE,
        TaskKind::Assessment { .. } => &ASSESSMENT_SHAPE,
    }
}

/// Validate a payload against a shape. `Ok(())` or every violation found.
pub fn validate(payload: &Value, shape: &ContentShape) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();

    let obj = match payload.as_object() {
        Some(obj) => obj,
        None => {
            return Err(vec![Violation {
                path: "$".into(),
                reason: format!("expected a JSON object for {}", shape.name),
            }]);
        }
    };

    for field in shape.fields {
        let value = obj.get(field.path).filter(|v| !v.is_null());
        for rule in field.rules {
            match (rule, value) {
                (FieldRule::Required, None) => {
                    violations.push(Violation {
                        path: field.path.into(),
                        reason: "required field is missing".into(),
                    });
                    // Other rules on a missing field would only repeat the news.
                    break;
                }
                (FieldRule::Required, Some(_)) => {}
                (_, None) => {}
                (FieldRule::MinLength(min), Some(v)) => match v.as_str() {
                    Some(s) if s.chars().count() < *min => violations.push(Violation {
                        path: field.path.into(),
                        reason: format!("must be at least {min} characters"),
                    }),
                    Some(_) => {}
                    None => violations.push(Violation {
                        path: field.path.into(),
                        reason: "must be a string".into(),
                    }),
                },
                (FieldRule::MinItems(min), Some(v)) => match v.as_array() {
                    Some(items) if items.len() < *min => violations.push(Violation {
                        path: field.path.into(),
                        reason: format!("must contain at least {min} items"),
                    }),
                    Some(_) => {}
                    None => violations.push(Violation {
                        path: field.path.into(),
                        reason: "must be a list".into(),
                    }),
                },
                (FieldRule::OneOf(allowed), Some(v)) => match v.as_str() {
                    Some(s) if allowed.contains(&s) => {}
                    Some(s) => violations.push(Violation {
                        path: field.path.into(),
                        reason: format!("\"{s}\" is not one of {allowed:?}"),
                    }),
                    None => violations.push(Violation {
                        path: field.path.into(),
                        reason: "must be a string".into(),
                    }),
                },
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Deterministic, schema-valid placeholder for a degradable kind whose
/// retries are exhausted. Kept next to the shapes so the two cannot drift.
pub fn fallback_payload(kind: &TaskKind) -> Value {
    match kind {
        TaskKind::Outline => serde_json::json!({
            "title": "Course outline",
            "summary": "Placeholder outline. Generation was unavailable; this course needs to be regenerated.",
            "depth": "intermediate",
            "modules": ["Module 1"],
        }),
        TaskKind::Module { index } => serde_json::json!({
            "title": format!("Module {}", index + 1),
            "overview": "Placeholder module overview. Generation was unavailable for this module.",
            "objectives": ["Review this module", "Regenerate its content"],
        }),
        TaskKind::Lesson {
            module_index,
            index,
        } => serde_json::json!({
            "title": format!("Lesson {}.{}", module_index + 1, index + 1),
            "body": "This lesson could not be generated automatically. The content service was \
                     unavailable after several attempts, so this placeholder was inserted to keep \
                     the course structure intact. Regenerate this lesson to replace it with real \
                     material covering the topics planned for this section of the module.",
            "key_points": ["Content pending regeneration", "Structure preserved"],
        }),
        TaskKind::Assessment { module_index } => serde_json::json!({
            "title": format!("Module {} assessment", module_index + 1),
            "questions": [
                "Placeholder question 1 (regenerate this assessment)",
                "Placeholder question 2 (regenerate this assessment)",
                "Placeholder question 3 (regenerate this assessment)",
            ],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_outline_passes() {
        let payload = json!({
            "title": "Intro to Rust",
            "summary": "A practical introduction to the Rust programming language for working developers.",
            "depth": "introductory",
            "modules": ["Basics", "Ownership"],
        });
        assert!(validate(&payload, shape_for(&TaskKind::Outline)).is_ok());
    }

    #[test]
    fn missing_field_reports_path_and_reason() {
        let payload = json!({
            "title": "Intro to Rust",
            "depth": "introductory",
            "modules": ["Basics"],
        });
        let violations = validate(&payload, shape_for(&TaskKind::Outline)).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "summary");
        assert_eq!(violations[0].reason, "required field is missing");
    }

    #[test]
    fn short_text_and_bad_enum_both_reported() {
        let payload = json!({
            "title": "Ry",
            "summary": "too short",
            "depth": "expert",
            "modules": ["Basics"],
        });
        let violations = validate(&payload, shape_for(&TaskKind::Outline)).unwrap_err();
        assert_eq!(violations.len(), 3);
        let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"title"));
        assert!(paths.contains(&"summary"));
        assert!(paths.contains(&"depth"));
    }

    #[test]
    fn list_minimums_enforced() {
        let payload = json!({
            "title": "Module assessment",
            "questions": ["only one question"],
        });
        let violations =
            validate(&payload, shape_for(&TaskKind::Assessment { module_index: 0 })).unwrap_err();
        assert_eq!(violations[0].path, "questions");
        assert!(violations[0].reason.contains("at least 3"));
    }

    #[test]
    fn non_object_payload_is_a_single_violation() {
        let violations = validate(&json!("just a string"), shape_for(&TaskKind::Outline))
            .unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$");
    }

    #[test]
    fn wrong_type_for_list_field() {
        let payload = json!({
            "title": "Fine title",
            "overview": "An overview long enough to satisfy the minimum length requirement here.",
            "objectives": "not a list",
        });
        let violations =
            validate(&payload, shape_for(&TaskKind::Module { index: 0 })).unwrap_err();
        assert_eq!(violations[0].reason, "must be a list");
    }

    #[test]
    fn violation_display_is_replayable() {
        let v = Violation {
            path: "body".into(),
            reason: "must be at least 200 characters".into(),
        };
        assert_eq!(v.to_string(), "body: must be at least 200 characters");
    }

    #[test]
    fn fallback_payloads_satisfy_their_own_shapes() {
        let kinds = [
            TaskKind::Outline,
            TaskKind::Module { index: 0 },
            TaskKind::Lesson {
                module_index: 1,
                index: 2,
            },
            TaskKind::Assessment { module_index: 3 },
        ];
        for kind in kinds {
            let payload = fallback_payload(&kind);
            assert!(
                validate(&payload, shape_for(&kind)).is_ok(),
                "fallback for {kind} failed its own shape"
            );
        }
    }
}
