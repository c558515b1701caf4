use serde_json::{json, Map, Value};

use super::hub::StreamError;
use super::ModelDescriptor;
use crate::attachment::image_data_url;
use crate::conversation::{Conversation, Message};
use crate::functions::{functions_to_spec, FunctionDeclaration};

/// Build the JSON request body for one run.
///
/// The body leads with the system prompt, then one entry per conversation
/// message. `functions` is only advertised when the descriptor enables
/// function calling and at least one declaration exists.
pub(crate) fn build_request_body(
    descriptor: &ModelDescriptor,
    system_prompt: &str,
    functions: &[FunctionDeclaration],
    conversation: &Conversation,
) -> Result<Value, StreamError> {
    let mut messages = vec![json!({
        "role": "system",
        "content": system_prompt,
    })];
    for message in conversation.messages() {
        messages.push(message_to_spec(message, descriptor)?);
    }

    let mut body = Map::new();
    body.insert("model".to_string(), json!(descriptor.model));
    body.insert("messages".to_string(), Value::Array(messages));
    body.insert("temperature".to_string(), json!(descriptor.temperature()));
    body.insert("stream".to_string(), json!(true));
    if descriptor.function_calling && !functions.is_empty() {
        body.insert(
            "functions".to_string(),
            Value::Array(functions_to_spec(functions)),
        );
    }

    Ok(Value::Object(body))
}

fn message_to_spec(message: &Message, descriptor: &ModelDescriptor) -> Result<Value, StreamError> {
    let mut entry = Map::new();
    entry.insert("role".to_string(), json!(message.role()));

    if descriptor.function_calling {
        if let Some(name) = message.name() {
            entry.insert("name".to_string(), json!(name));
        }
        if let Some(call) = message.function_call() {
            // The API wants arguments as a JSON string, not an object.
            let arguments = serde_json::to_string(&call.arguments)
                .map_err(|e| StreamError::Serialize(e.to_string()))?;
            entry.insert(
                "function_call".to_string(),
                json!({ "name": call.name, "arguments": arguments }),
            );
        }
    }

    let text = message_text(message);
    if descriptor.vision {
        let mut parts = vec![json!({ "type": "text", "text": text })];
        for attachment in message.attachments() {
            if let Some(bytes) = attachment.as_image_bytes() {
                parts.push(image_part(bytes));
            }
        }
        for image in message.images() {
            parts.push(image_part(image));
        }
        entry.insert("content".to_string(), Value::Array(parts));
    } else {
        entry.insert("content".to_string(), json!(text));
    }

    Ok(Value::Object(entry))
}

/// Attachment text fragments, a blank line, then the message's own content.
/// A whitespace-only result is sent as-is; only the separator for absent
/// attachment text is normalized away.
fn message_text(message: &Message) -> String {
    let fragments: Vec<&str> = message
        .attachments()
        .iter()
        .filter_map(|a| a.as_text())
        .collect();
    if fragments.is_empty() {
        return message.content().to_string();
    }
    format!("{}\n\n{}", fragments.join("\n"), message.content())
}

fn image_part(bytes: &[u8]) -> Value {
    json!({
        "type": "image_url",
        "image_url": { "url": image_data_url(bytes) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::Attachment;
    use crate::conversation::FunctionCall;
    use crate::functions::FunctionParam;

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor {
            model: "gpt-4".to_string(),
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: "k".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 600,
            function_calling: false,
            vision: false,
            temperature_tenths: 7,
        }
    }

    fn weather_function() -> FunctionDeclaration {
        FunctionDeclaration {
            name: "get_current_weather".to_string(),
            description: "Get the current weather in a given location".to_string(),
            params: vec![FunctionParam {
                name: "location".to_string(),
                description: "The city and state".to_string(),
                param_type: "string".to_string(),
                required: true,
            }],
        }
    }

    fn single_message(message: Message) -> Conversation {
        let mut c = Conversation::new();
        c.add(message);
        c
    }

    #[test]
    fn body_has_system_prompt_model_temperature_and_stream() {
        let conv = single_message(Message::user("1").with_text("Hi"));
        let body = build_request_body(&descriptor(), "Be helpful.", &[], &conv).unwrap();

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["temperature"], json!(0.7));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Be helpful.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Hi");
    }

    #[test]
    fn no_functions_key_without_function_calling() {
        let conv = single_message(Message::user("1").with_text("Hi"));
        let body =
            build_request_body(&descriptor(), "sys", &[weather_function()], &conv).unwrap();
        assert!(body.get("functions").is_none());
    }

    #[test]
    fn functions_key_present_when_enabled() {
        let conv = single_message(Message::user("1").with_text("Hi"));
        let desc = ModelDescriptor {
            function_calling: true,
            ..descriptor()
        };
        let body = build_request_body(&desc, "sys", &[weather_function()], &conv).unwrap();

        let functions = body["functions"].as_array().unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0]["name"], "get_current_weather");
        assert_eq!(functions[0]["parameters"]["type"], "object");
    }

    #[test]
    fn function_call_history_serializes_arguments_as_string() {
        let mut arguments = Map::new();
        arguments.insert("location".to_string(), json!("Oslo"));
        let call = FunctionCall {
            name: "get_current_weather".to_string(),
            arguments,
        };
        let conv = single_message(Message::assistant("1").with_function_call(call));
        let desc = ModelDescriptor {
            function_calling: true,
            ..descriptor()
        };
        let body = build_request_body(&desc, "sys", &[], &conv).unwrap();

        let entry = &body["messages"][1];
        assert_eq!(entry["function_call"]["name"], "get_current_weather");
        assert_eq!(
            entry["function_call"]["arguments"],
            json!(r#"{"location":"Oslo"}"#)
        );
    }

    #[test]
    fn function_name_only_serialized_when_enabled() {
        let message = Message::function("1", "get_current_weather").with_text("72F");
        let desc = ModelDescriptor {
            function_calling: true,
            ..descriptor()
        };
        let body = build_request_body(&desc, "sys", &[], &single_message(message.clone())).unwrap();
        assert_eq!(body["messages"][1]["name"], "get_current_weather");

        let body = build_request_body(&descriptor(), "sys", &[], &single_message(message)).unwrap();
        assert!(body["messages"][1].get("name").is_none());
    }

    #[test]
    fn attachment_text_precedes_message_content() {
        let message = Message::user("1")
            .with_text("What does this do?")
            .with_attachment(Attachment::text("fn main() {}"));
        let body =
            build_request_body(&descriptor(), "sys", &[], &single_message(message)).unwrap();
        assert_eq!(
            body["messages"][1]["content"],
            "fn main() {}\n\nWhat does this do?"
        );
    }

    #[test]
    fn whitespace_only_content_is_sent_as_is() {
        let message = Message::user("1").with_attachment(Attachment::text(""));
        let body =
            build_request_body(&descriptor(), "sys", &[], &single_message(message)).unwrap();
        assert_eq!(body["messages"][1]["content"], "\n\n");
    }

    #[test]
    fn vision_content_is_text_part_then_image_parts() {
        let message = Message::user("1")
            .with_text("Describe this")
            .with_attachment(Attachment::image(vec![0xff, 0xd8]));
        let desc = ModelDescriptor {
            vision: true,
            ..descriptor()
        };
        let body = build_request_body(&desc, "sys", &[], &single_message(message)).unwrap();

        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "Describe this");
        assert_eq!(parts[1]["type"], "image_url");
        let url = parts[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn inline_images_follow_attachment_images() {
        let message = Message::user("1")
            .with_attachment(Attachment::image(vec![1]))
            .with_image(vec![2]);
        let desc = ModelDescriptor {
            vision: true,
            ..descriptor()
        };
        let body = build_request_body(&desc, "sys", &[], &single_message(message)).unwrap();

        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[1]["image_url"]["url"],
            json!(crate::attachment::image_data_url(&[1]))
        );
        assert_eq!(
            parts[2]["image_url"]["url"],
            json!(crate::attachment::image_data_url(&[2]))
        );
    }

    #[test]
    fn without_vision_content_stays_a_plain_string() {
        let message = Message::user("1")
            .with_text("Describe this")
            .with_attachment(Attachment::image(vec![0xff, 0xd8]));
        let body =
            build_request_body(&descriptor(), "sys", &[], &single_message(message)).unwrap();
        assert!(body["messages"][1]["content"].is_string());
    }
}
