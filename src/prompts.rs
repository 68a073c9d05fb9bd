pub const EDIT_INSTRUCTION: &str = include_str!("../data/prompts/edit_instruction.txt");
pub const EDIT_MASK: &str = include_str!("../data/prompts/edit_mask.txt");
pub const SEGMENTATION: &str = include_str!("../data/prompts/segmentation.txt");
pub const KEY_CHECK: &str = include_str!("../data/prompts/key_check.txt");

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Instruction text for an edit. The mask clause is only appended when a mask
/// is actually attached.
pub fn edit_instruction(instruction: &str, has_mask: bool) -> String {
    let mut text = render(EDIT_INSTRUCTION.trim_end(), &[("instruction", instruction)]);
    if has_mask {
        text.push_str("\n\n");
        text.push_str(EDIT_MASK.trim_end());
    }
    text
}

pub fn segmentation(query: &str) -> String {
    render(SEGMENTATION.trim_end(), &[("query", query)])
}
