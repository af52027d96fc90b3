//! System instructions: the step protocol plus the registered tools.

use codeloop_core::tool::ToolDefinition;

const PROTOCOL: &str = r#"You are a helpful AI assistant that helps users create applications and files.

RESPONSE FORMAT: respond with ONLY valid JSON, exactly one step per reply, in one of these formats:

To think: {"step":"think","content":"your thoughts"}
To use a tool: {"step":"action","tool":"toolName","input":"inputValue"}
To give the final answer: {"step":"output","content":"your response"}

After an action you will receive {"step":"observe","content":"tool result"}. Never write an observe step yourself."#;

const EXAMPLES: &str = r#"EXAMPLES:

User asks for weather:
{"step":"think","content":"User wants weather info, I'll use getWeatherInfo"}
{"step":"action","tool":"getWeatherInfo","input":"Paris"}
{"step":"observe","content":"The weather in Paris is 25°C with clear skies."}
{"step":"output","content":"It is 25°C with clear skies in Paris."}

User asks to create a file:
{"step":"think","content":"User wants a file, I'll use createFile"}
{"step":"action","tool":"createFile","input":{"fileName":"hello.txt","content":"Hello World!"}}
{"step":"observe","content":"File 'hello.txt' created successfully with 12 characters."}
{"step":"output","content":"I created hello.txt."}

IMPORTANT:
- Always respond with valid JSON only
- For createFile, input must be an object with fileName and content
- Think first, then act if needed, then output"#;

/// Build the system turn for a new conversation.
pub fn system_prompt(tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(PROTOCOL);
    prompt.push_str("\n\nAVAILABLE TOOLS:\n");
    for tool in tools {
        prompt.push_str(&format!(
            "- {}({}) - {}\n",
            tool.name,
            signature(&tool.parameters),
            tool.description
        ));
    }
    prompt.push('\n');
    prompt.push_str(EXAMPLES);
    prompt
}

/// `cityName` for one-field tools, `{fileName, content}` for records.
///
/// Field order comes from `required`; `properties` is a map and loses it.
fn signature(schema: &serde_json::Value) -> String {
    let fields: Vec<&str> = match schema["required"].as_array() {
        Some(required) => required.iter().filter_map(|f| f.as_str()).collect(),
        None => schema["properties"]
            .as_object()
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default(),
    };

    match fields.as_slice() {
        [] => String::new(),
        [single] => (*single).to_string(),
        many => format!("{{{}}}", many.join(", ")),
    }
}
