//! Single-page form served at `/`.
//!
//! The page only talks to `POST /analyze`; the result download is built in
//! the browser from the returned text so the document is not analyzed twice.

use askama::Template;
use pulldown_cmark::{html, Event, Options, Parser};

/// Questions pre-filled in the prompt box. The server never substitutes
/// these for an empty prompt.
pub const DEFAULT_PROMPT: &str = "
Podrías responder a todas estas preguntas:\x20

1. ¿De qué trata el documento?
2. ¿Cuál es el nombre del documento?
3. ¿Quiénes son los autores del documento?
4. ¿Qué división elaboró el documento?
5. ¿Cuáles son los principales mensajes del documento?
6. ¿Cuáles son los principales tópicos que aborda el documento?
7. ¿A qué países hace referencia el documento?
8. ¿Cuáles son los principales datos que entrega el documento?
9. ¿Qué recomendaciones da el documento?
10. ¿Cuántos capítulos tiene el documento?
";

/// File name offered for the downloaded result.
pub const DOWNLOAD_FILE_NAME: &str = "analisis_documento.txt";

/// The upload form. Askama escapes every field.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate<'a> {
    pub model: &'a str,
    pub max_mb: usize,
    pub download_name: &'a str,
    pub prompt: &'a str,
}

impl<'a> IndexTemplate<'a> {
    pub fn new(model: &'a str, max_upload_bytes: usize) -> Self {
        Self {
            model,
            max_mb: max_upload_bytes / (1024 * 1024),
            download_name: DOWNLOAD_FILE_NAME,
            prompt: DEFAULT_PROMPT,
        }
    }
}

/// Render the analyzer's markdown answer to HTML.
///
/// Raw HTML in the answer is turned into text so it shows up escaped.
pub fn render_markdown(text: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_has_ten_questions() {
        let questions = DEFAULT_PROMPT
            .lines()
            .filter(|l| l.trim_start().starts_with(|c: char| c.is_ascii_digit()))
            .count();
        assert_eq!(questions, 10);
    }

    #[test]
    fn test_default_prompt_layout() {
        assert!(DEFAULT_PROMPT.starts_with("\nPodrías responder a todas estas preguntas: \n\n1."));
        assert!(DEFAULT_PROMPT.ends_with("¿Cuántos capítulos tiene el documento?\n"));
    }

    #[test]
    fn test_render_fills_placeholders() {
        let page = IndexTemplate::new("gemini-1.5-flash", 20 * 1024 * 1024)
            .render()
            .unwrap();
        assert!(page.contains("Google Gemini (gemini-1.5-flash)"));
        assert!(page.contains("Tamaño máximo de archivo: 20MB"));
        assert!(page.contains("¿Cuántos capítulos tiene el documento?"));
        assert!(page.contains("analisis_documento.txt"));
        assert!(page.contains(r#"id="analyze" disabled"#));
    }

    #[test]
    fn test_render_keeps_leading_prompt_newline() {
        // The browser drops one newline right after <textarea>.
        let page = IndexTemplate::new("m", 1024 * 1024).render().unwrap();
        assert!(page.contains("escribir las tuyas propias\">\n\nPodrías responder"));
    }

    #[test]
    fn test_render_escapes_fields() {
        let page = IndexTemplate::new("<script>x</script>", 1024 * 1024)
            .render()
            .unwrap();
        assert!(!page.contains("<script>x</script>"));
        assert!(page.contains("&lt;script&gt;x&lt;/script&gt;"));
    }

    #[test]
    fn test_markdown_bold_and_lists() {
        let html = render_markdown("1. **Tema:** un saludo\n2. Autores: *ninguno*\n");
        assert!(html.contains("<ol>"));
        assert!(html.contains("<strong>Tema:</strong>"));
        assert!(html.contains("<em>ninguno</em>"));
    }

    #[test]
    fn test_markdown_escapes_raw_html() {
        let html = render_markdown("Texto <script>alert(1)</script> fin\n\n<div onclick=\"x\">bloque</div>\n");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<div onclick"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
