//! Prompt text for the language model

/// System prompt for calls that must return JSON
pub const JSON_SYSTEM_PROMPT: &str =
    "You are a helpful AI that generates structured educational content. Always respond with valid JSON.";

/// System prompt for prose explanations
pub const PROSE_SYSTEM_PROMPT: &str = "You are a helpful AI that generates educational content.";

/// Render an ancestor path as `Root > Child > Grandchild`
pub fn render_path(path: &[String]) -> String {
    path.join(" > ")
}

pub fn subtopics_prompt(topic: &str, count: usize) -> String {
    format!(
        r#"Generate {count} essential subtopics for learning about "{topic}".
For each subtopic provide:
1. A concise title (max 5 words)
2. A brief explanation (2-3 sentences)
Format the response as a JSON object with a "subtopics" array of objects with properties: "title", "explanation"
Make sure the output is valid JSON."#
    )
}

pub fn expand_prompt(main_topic: &str, path: &[String], current_topic: &str, count: usize) -> String {
    let path = render_path(path);
    format!(
        r#"Generate {count} detailed subtopics for "{current_topic}" in the context of {main_topic}.
Path to current topic: {path}
For each subtopic provide:
1. A concise title (max 5 words)
2. A brief explanation (2-3 sentences)
3. A short note on why this subtopic is important
Format the response as a JSON object with a "subtopics" array of objects with properties: "title", "explanation", "importance"
Make sure the output is valid JSON."#
    )
}

pub fn explain_prompt(main_topic: &str, path: &[String], current_topic: &str) -> String {
    let path = render_path(path);
    format!(
        r#"Generate a detailed explanation about "{current_topic}" in the context of {main_topic}.
Path to current topic: {path}
The explanation should:
1. Define the concept clearly
2. Explain its importance in the broader topic
3. Provide 1-2 examples if applicable
4. Be around 150-200 words"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> Vec<String> {
        vec!["Photosynthesis".to_string(), "Light reactions".to_string()]
    }

    #[test]
    fn test_render_path() {
        assert_eq!(render_path(&path()), "Photosynthesis > Light reactions");
        assert_eq!(render_path(&[]), "");
    }

    #[test]
    fn test_subtopics_prompt_mentions_count_and_topic() {
        let prompt = subtopics_prompt("Photosynthesis", 5);
        assert!(prompt.contains("Generate 5 essential subtopics"));
        assert!(prompt.contains("\"Photosynthesis\""));
        assert!(prompt.contains("\"subtopics\""));
    }

    #[test]
    fn test_expand_prompt_includes_path_and_importance() {
        let prompt = expand_prompt("Photosynthesis", &path(), "Light reactions", 4);
        assert!(prompt.contains("Generate 4 detailed subtopics for \"Light reactions\""));
        assert!(prompt.contains("Path to current topic: Photosynthesis > Light reactions"));
        assert!(prompt.contains("\"importance\""));
    }

    #[test]
    fn test_explain_prompt_word_range() {
        let prompt = explain_prompt("Photosynthesis", &path(), "Light reactions");
        assert!(prompt.contains("150-200 words"));
    }
}
