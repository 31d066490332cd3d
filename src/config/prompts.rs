//! The fixed answer prompt.
//!
//! The template is a constant; only `{{context}}` and `{{question}}` vary per request.

use std::collections::HashMap;

/// Phrase the assistant is instructed to use when the context has no answer.
pub const REFUSAL_PHRASE: &str =
    "I'm sorry, but I couldn't find information about that in the provided context.";

/// Prompt sent to the language model for every question.
pub const ANSWER_TEMPLATE: &str = r#"You are a virtual assistant for I2E Consulting, designed to provide accurate and helpful information to users.
Your role is to answer questions about the company, including its services, products, clients, achievements, and other relevant details.

**Guidelines**:
1. Answer the question in a detailed manner, making sure to provide all relevant details.
2. If asked about a specific person, search extensively for the person's name and provide all the relevant information about that person and their role.
3. Generate answers in a point-wise format, providing clear and concise details.
4. If the user asks for a specific topic in detail or in brief, search extensively through the entire set of documents and provide the answer in the requested detail or brevity.
5. Use the provided data to generate your answers.
6. For services:
    - Provide clear and concise details about specific offerings.
7. For products:
    - Explain their features, benefits, and use cases.
8. If asked about clients or partnerships, share general insights or feedback from clients.
9. If the context does not contain the answer, respond with: "I'm sorry, but I couldn't find information about that in the provided context."
10. Avoid providing incorrect or speculative answers.
11. Answer the question based on the context provided. DO NOT use markdown formatting such as **, __, or * in your response. For emphasis, use plain text only.

Context: {{context}}

Question: {{question}}

Answer: "#;

/// Prompt rendering.
pub struct Prompts;

impl Prompts {
    /// Render the answer prompt for a question and its retrieved context.
    pub fn answer(context: &str, question: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("context".to_string(), context.to_string());
        vars.insert("question".to_string(), question.to_string());
        Self::render(ANSWER_TEMPLATE, &vars)
    }

    /// Render a template, replacing `{{name}}` placeholders in a single pass.
    ///
    /// Substituted values are not rescanned, so a question containing
    /// `{{context}}` is passed through literally. Unknown placeholders are kept.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let key = &after[..end];
                    match vars.get(key) {
                        Some(value) => result.push_str(value),
                        None => {
                            result.push_str("{{");
                            result.push_str(key);
                            result.push_str("}}");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    result.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        result.push_str(rest);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_carries_fixed_instructions() {
        assert!(ANSWER_TEMPLATE.contains(REFUSAL_PHRASE));
        assert!(ANSWER_TEMPLATE.contains("DO NOT use markdown formatting"));
        assert!(ANSWER_TEMPLATE.contains("{{context}}"));
        assert!(ANSWER_TEMPLATE.contains("{{question}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let prompt = Prompts::answer("ctx", "what is {{context}}?");
        assert!(prompt.contains("Question: what is {{context}}?"));
        assert!(prompt.contains("Context: ctx\n"));
    }

    #[test]
    fn test_render_keeps_unknown_and_unterminated() {
        let vars = HashMap::new();
        assert_eq!(Prompts::render("a {{x}} b {{y", &vars), "a {{x}} b {{y");
    }

    #[test]
    fn test_empty_context() {
        let prompt = Prompts::answer("", "anything");
        assert!(prompt.contains("Context: \n\nQuestion: anything\n\nAnswer: "));
    }
}
