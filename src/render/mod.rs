//! Act rendering against an external response builder
//!
//! The core's contract with the host's response layer is append-only:
//! one prompt (and, for questions, one reprompt) fragment per act, in act
//! order, plus any visual directives. Rendering is an exhaustive match
//! over the act sums, so adding an act kind without a rendering branch is
//! a compile error.

use crate::acts::{ContentAct, InitiativeAct, SystemAct};

/// Order-preserving sink for rendered output. One call per act.
pub trait ResponseBuilder {
    /// Append a spoken prompt fragment.
    fn add_prompt_fragment(&mut self, fragment: &str);

    /// Append a reprompt fragment, spoken when the user stays silent.
    fn add_reprompt_fragment(&mut self, fragment: &str);

    /// Append a visual-document directive, opaque to the core.
    fn add_directive(&mut self, directive: serde_json::Value);
}

/// Default speech-only response builder.
#[derive(Debug, Default)]
pub struct SpeechResponseBuilder {
    prompt: Vec<String>,
    reprompt: Vec<String>,
    directives: Vec<serde_json::Value>,
}

impl SpeechResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated prompt, fragments joined with spaces.
    pub fn prompt(&self) -> String {
        self.prompt.join(" ")
    }

    /// The accumulated reprompt, fragments joined with spaces.
    pub fn reprompt(&self) -> String {
        self.reprompt.join(" ")
    }

    /// Appended directives, in order.
    pub fn directives(&self) -> &[serde_json::Value] {
        &self.directives
    }
}

impl ResponseBuilder for SpeechResponseBuilder {
    fn add_prompt_fragment(&mut self, fragment: &str) {
        self.prompt.push(fragment.to_string());
    }

    fn add_reprompt_fragment(&mut self, fragment: &str) {
        self.reprompt.push(fragment.to_string());
    }

    fn add_directive(&mut self, directive: serde_json::Value) {
        self.directives.push(directive);
    }
}

/// Render every act into the builder, in order.
pub fn render_acts(acts: &[SystemAct], builder: &mut dyn ResponseBuilder) {
    for act in acts {
        match act {
            SystemAct::Content(act) => builder.add_prompt_fragment(&render_content(act)),
            SystemAct::Initiative(act) => {
                let fragment = render_initiative(act);
                builder.add_prompt_fragment(&fragment);
                builder.add_reprompt_fragment(&fragment);
            }
        }
    }
}

fn render_content(act: &ContentAct) -> String {
    match act {
        ContentAct::ValueSet { value, .. } => format!("OK, {value}."),
        ContentAct::ValueChanged {
            previous, value, ..
        } => format!("OK, changed from {previous} to {value}."),
        ContentAct::InvalidValue { reason, .. } => format!("Sorry, {reason}."),
        ContentAct::Acknowledged { .. } => "OK.".to_string(),
        ContentAct::LiteralContent { text, .. } => text.clone(),
    }
}

fn render_initiative(act: &InitiativeAct) -> String {
    match act {
        InitiativeAct::RequestValue { target, .. } => match target {
            Some(target) => format!("What {target}?"),
            None => "What value?".to_string(),
        },
        InitiativeAct::RequestChangedValue { target, .. } => match target {
            Some(target) => format!("What should the {target} be instead?"),
            None => "What should it be instead?".to_string(),
        },
        InitiativeAct::ConfirmValue { value, .. } => format!("Was that {value}?"),
        InitiativeAct::Disambiguate { choices, .. } => {
            format!("Did you mean {}?", join_with_or(choices))
        }
    }
}

/// Join labels the way a question offers them: "A", "A or B", "A, B, or C".
fn join_with_or(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} or {second}"),
        [init @ .., last] => format!("{}, or {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_with_or() {
        let items: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(join_with_or(&items), "A, B, or C");
        assert_eq!(join_with_or(&items[..2]), "A or B");
        assert_eq!(join_with_or(&items[..1]), "A");
    }

    #[test]
    fn test_initiative_acts_fill_the_reprompt() {
        let acts = vec![
            SystemAct::Content(ContentAct::ValueSet {
                control_id: "start".to_string(),
                value: "monday".to_string(),
            }),
            SystemAct::Initiative(InitiativeAct::Disambiguate {
                control_id: "root".to_string(),
                choices: vec![
                    "start date".to_string(),
                    "end date".to_string(),
                ],
            }),
        ];

        let mut builder = SpeechResponseBuilder::new();
        render_acts(&acts, &mut builder);

        assert_eq!(
            builder.prompt(),
            "OK, monday. Did you mean start date or end date?"
        );
        assert_eq!(builder.reprompt(), "Did you mean start date or end date?");
        assert!(builder.directives().is_empty());
    }
}
