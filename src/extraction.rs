//! Turning a developer's free-form response into code.

/// Marker after which a response holds its answer.
pub const RESPONSE_MARKER: &str = "RESPONSE:";

/// Extract the code to run from a developer response.
///
/// - only the text after the first [`RESPONSE_MARKER`] is considered, if present;
/// - fenced code blocks are preferred, the first one defining `def {function_name}`
///   winning over the others;
/// - otherwise, if the text defines `def {function_name}`, that definition and its
///   indented body are kept;
/// - otherwise the trimmed text is returned as is.
///
/// Returns `None` for a blank response, which the engine treats as a missing submission.
pub fn extract_code(response: &str, function_name: Option<&str>) -> Option<String> {
    let text = match response.find(RESPONSE_MARKER) {
        Some(index) => &response[index + RESPONSE_MARKER.len()..],
        None => response,
    };

    let definition = function_name.map(|name| format!("def {name}"));
    let blocks = fenced_blocks(text);

    let code = match &definition {
        Some(def) => blocks
            .iter()
            .find(|block| block.contains(def.as_str()))
            .or(blocks.first())
            .map(|block| block.to_string())
            .or_else(|| function_definition(text, def)),
        None => blocks.first().map(|block| block.to_string()),
    }
    .unwrap_or_else(|| text.trim().to_string());

    (!code.trim().is_empty()).then_some(code)
}

/// Contents of every ```` ``` ```` fenced block, language tag stripped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // the language tag runs until the end of the opening line
        let Some(newline) = after_fence.find('\n') else {
            break;
        };
        let body = &after_fence[newline + 1..];
        let Some(close) = body.find("```") else {
            break;
        };
        let block = body[..close].trim_matches('\n').trim_end();
        if !block.trim().is_empty() {
            blocks.push(block);
        }
        rest = &body[close + 3..];
    }
    blocks
}

/// The line holding `definition` and the indented (or blank) lines following it.
fn function_definition(text: &str, definition: &str) -> Option<String> {
    let mut lines = text.lines().skip_while(|line| !line.contains(definition));
    let first = lines.next()?;
    let mut function = vec![first.trim_start()];
    function.extend(
        lines.take_while(|line| line.trim().is_empty() || line.starts_with([' ', '\t'])),
    );
    Some(function.join("\n").trim_end().to_string())
}
