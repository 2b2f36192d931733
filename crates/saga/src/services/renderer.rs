//! PDF renderer trait and a minimal text label renderer.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::LabelData;

use crate::error::ArtifactError;

/// Turns label data into PDF bytes. Treated as a pure function.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, label: &LabelData) -> Result<Vec<u8>, ArtifactError>;
}

/// Renders one A6-sized page with the label lines in Helvetica.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPdfRenderer;

const PAGE_WIDTH: u32 = 298;
const PAGE_HEIGHT: u32 = 420;
const FONT_SIZE: u32 = 11;
const LINE_HEIGHT: u32 = 16;

impl TextPdfRenderer {
    fn escape(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\\' | '(' | ')' => {
                    out.push('\\');
                    out.push(c);
                }
                c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
                _ => out.push('?'),
            }
        }
        out
    }

    fn content_stream(lines: &[String]) -> String {
        let mut stream = format!(
            "BT /F1 {FONT_SIZE} Tf {LINE_HEIGHT} TL 20 {} Td\n",
            PAGE_HEIGHT - 30
        );
        for line in lines {
            stream.push_str(&format!("({}) Tj T*\n", Self::escape(line)));
        }
        stream.push_str("ET");
        stream
    }

    /// Assembles a single-page PDF document around the label lines.
    pub fn document(lines: &[String]) -> Vec<u8> {
        let content = Self::content_stream(lines);
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
            format!(
                "<< /Length {} >>\nstream\n{content}\nendstream",
                content.len()
            ),
        ];

        let mut pdf = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.push_str(&format!("{} 0 obj\n{body}\nendobj\n", i + 1));
        }

        let xref_at = pdf.len();
        pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            pdf.push_str(&format!("{offset:010} 00000 n \n"));
        }
        pdf.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        ));
        pdf.into_bytes()
    }
}

#[async_trait]
impl PdfRenderer for TextPdfRenderer {
    async fn render(&self, label: &LabelData) -> Result<Vec<u8>, ArtifactError> {
        if label.pallet_number.is_empty() {
            return Err(ArtifactError::Render("label has no pallet number".to_string()));
        }
        Ok(Self::document(&label.lines()))
    }
}

#[derive(Debug, Default)]
struct InMemoryRendererState {
    fail_for: HashSet<String>,
    rendered: Vec<String>,
}

/// Text renderer with per-pallet failure injection, for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPdfRenderer {
    state: Arc<RwLock<InMemoryRendererState>>,
}

impl InMemoryPdfRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes rendering fail for one pallet number.
    pub fn fail_for(&self, pallet_number: &str) {
        self.state
            .write()
            .unwrap()
            .fail_for
            .insert(pallet_number.to_string());
    }

    /// Pallet numbers rendered so far, in call order.
    pub fn rendered(&self) -> Vec<String> {
        self.state.read().unwrap().rendered.clone()
    }
}

#[async_trait]
impl PdfRenderer for InMemoryPdfRenderer {
    async fn render(&self, label: &LabelData) -> Result<Vec<u8>, ArtifactError> {
        {
            let mut state = self.state.write().unwrap();
            if state.fail_for.contains(&label.pallet_number) {
                return Err(ArtifactError::Render(format!(
                    "template error for {}",
                    label.pallet_number
                )));
            }
            state.rendered.push(label.pallet_number.clone());
        }
        TextPdfRenderer.render(label).await
    }
}
