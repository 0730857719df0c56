//! Plain-text field renderer.

use schemaform::{FieldRenderer, FieldValidationState, FieldView};

/// One rendered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub group: Option<usize>,
    pub legend: Option<String>,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct TextRenderer;

impl TextRenderer {
    fn marker(state: Option<&FieldValidationState>) -> &'static str {
        match state {
            None => " ",
            Some(s) if s.pending => "~",
            Some(s) if s.is_invalid() => "x",
            Some(s) if s.is_valid() => "+",
            Some(_) => ".",
        }
    }
}

impl FieldRenderer for TextRenderer {
    type Output = Line;

    fn render(&self, view: FieldView<'_>) -> Line {
        let kind = view.kind().to_string();
        let mut text = format!(
            "[{}] {} {:<12} {}",
            Self::marker(view.state.as_ref()),
            if view.state.as_ref().is_some_and(|s| s.dirty) { "*" } else { " " },
            kind,
            view.label().unwrap_or(kind.as_str())
        );
        if let Some(value) = &view.value {
            text.push_str(&format!(" = {}", value));
        }
        let errors = view.errors();
        if !errors.is_empty() {
            text.push_str(&format!("  ({})", errors.join("; ")));
        }

        Line {
            group: view.group,
            legend: view.legend.map(str::to_string),
            text,
        }
    }
}

/// Join lines, opening a section whenever the group changes.
pub fn layout(lines: &[Line]) -> String {
    let mut out = String::new();
    let mut current = None;
    for line in lines {
        if line.group.is_some() && line.group != current {
            let title = line
                .legend
                .clone()
                .unwrap_or_else(|| format!("Group {}", line.group.unwrap_or_default() + 1));
            out.push_str(&format!("== {} ==\n", title));
        }
        current = line.group;
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use schemaform::prelude::*;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_render_grouped_form() {
        let schema = FormSchema::grouped(vec![
            FieldGroup::new(vec![
                FieldSchema::new(FieldKind::Input)
                    .with_model("name")
                    .with_label("Name")
                    .with_rule("required", true)
                    .with_message("required", "Name is required"),
            ])
            .with_legend("Account"),
            FieldGroup::new(vec![FieldSchema::new(FieldKind::Submit)]),
        ]);
        let model: Model = [("name".to_string(), json!(""))].into_iter().collect();
        let mut form = FormEngine::new(schema, model).unwrap();
        form.settle().await;

        let text = layout(&form.render(&TextRenderer));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "== Account ==");
        assert!(lines[1].starts_with("[x]"));
        assert!(lines[1].ends_with("(Name is required)"));
        assert_eq!(lines[2], "== Group 2 ==");
        assert!(lines[3].contains("submit"));
    }
}
