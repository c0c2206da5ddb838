//! TwiML documents for the voice webhooks

use phone_agent_core::Language;

/// Connect-to-media-stream response
#[derive(Debug, Clone)]
pub struct StreamTwiml<'a> {
    /// Spoken before the stream opens; skipped when empty
    pub greeting: &'a str,
    pub voice: &'a str,
    /// Host (and optional port) serving `/media-stream`
    pub host: &'a str,
    pub language: Language,
}

impl StreamTwiml<'_> {
    pub fn stream_url(&self) -> String {
        format!("wss://{}/media-stream", self.host.trim_end_matches('/'))
    }

    pub fn render(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);

        let greeting = self.greeting.trim();
        if !greeting.is_empty() {
            xml.push_str(&format!(
                r#"<Say voice="{}">{}</Say>"#,
                escape(self.voice),
                escape(greeting)
            ));
        }

        xml.push_str(&format!(
            r#"<Connect><Stream url="{}"><Parameter name="language" value="{}"/></Stream></Connect>"#,
            escape(&self.stream_url()),
            self.language.tag()
        ));
        xml.push_str("</Response>");
        xml
    }
}

/// Escape text for XML content and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_greeting() {
        let xml = StreamTwiml {
            greeting: "Hello! This is an AI assistant calling.",
            voice: "Polly.Aditi",
            host: "agent.example.com",
            language: Language::Telugu,
        }
        .render();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#));
        assert!(xml.contains(r#"<Say voice="Polly.Aditi">Hello! This is an AI assistant calling.</Say>"#));
        assert!(xml.contains(r#"<Stream url="wss://agent.example.com/media-stream">"#));
        assert!(xml.contains(r#"<Parameter name="language" value="te-IN"/>"#));
        assert!(xml.ends_with("</Connect></Response>"));
        // Greeting plays before the stream connects
        assert!(xml.find("<Say").unwrap() < xml.find("<Connect>").unwrap());
    }

    #[test]
    fn test_empty_greeting_skips_say() {
        let xml = StreamTwiml {
            greeting: "  ",
            voice: "Polly.Aditi",
            host: "localhost:8000",
            language: Language::Hindi,
        }
        .render();

        assert!(!xml.contains("<Say"));
        assert!(xml.contains("wss://localhost:8000/media-stream"));
        assert!(xml.contains(r#"value="hi-IN""#));
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape(r#"Tom & "Jerry" <3 'x'"#), "Tom &amp; &quot;Jerry&quot; &lt;3 &apos;x&apos;");

        let xml = StreamTwiml {
            greeting: "Q&A line",
            voice: "Polly.Aditi",
            host: "h",
            language: Language::English,
        }
        .render();
        assert!(xml.contains(">Q&amp;A line</Say>"));
    }
}
