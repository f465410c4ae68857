pub const BRAND_CONTENT: &str = include_str!("../data/prompts/brand_content.txt");
pub const IMAGE_INSTRUCTION: &str = include_str!("../data/prompts/image_instruction.txt");

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}
