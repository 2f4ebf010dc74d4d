//! Payload enhancement applied once per job before dispatch.
//!
//! Enhancement is a pure function of the request: no I/O, no retries, and the same
//! request always produces the same dispatched payload.

use crate::job::{JobKind, JobPayload, JobRequest};

const INFOGRAPHIC_INSTRUCTION: &str = "Create an infographic-style data visualization: clean charts, graphs, or diagrams \
with clear labels, modern color palette, minimal text, professional business style. ";

const REFERENCE_STYLE_INSTRUCTION: &str = "Match the visual style, color palette, and aesthetic of the provided reference images. \
Maintain brand consistency while incorporating the following concept: ";

const QUALITY_INSTRUCTION: &str = "Professional quality, photorealistic or illustrated style, \
clean composition, 16:9 aspect ratio, suitable for business presentation. ";

pub trait PayloadEnhancer: Send + Sync {
    fn enhance(&self, request: &JobRequest) -> JobPayload;
}

/// Leaves payloads untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughEnhancer;

impl PayloadEnhancer for PassthroughEnhancer {
    fn enhance(&self, request: &JobRequest) -> JobPayload {
        request.payload.clone()
    }
}

/// Adds style and consistency instructions derived from the job kind and its
/// auxiliary inputs.
#[derive(Debug, Clone)]
pub struct StyleEnhancer {
    /// Extra brand description appended after the prompt, if any.
    pub style_description: Option<String>,
}

impl StyleEnhancer {
    pub fn new() -> Self {
        Self {
            style_description: None,
        }
    }

    pub fn with_style_description(mut self, description: impl Into<String>) -> Self {
        self.style_description = Some(description.into());
        self
    }

    fn build_prompt(&self, request: &JobRequest) -> String {
        let mut prompt = match request.kind {
            JobKind::Infographic => format!("{}{}", INFOGRAPHIC_INSTRUCTION, request.payload.prompt),
            JobKind::Plain => request.payload.prompt.clone(),
        };

        prompt = if request.auxiliary.is_empty() {
            format!("{}{}", QUALITY_INSTRUCTION, prompt)
        } else {
            format!("{}{}", REFERENCE_STYLE_INSTRUCTION, prompt)
        };

        if let Some(description) = self
            .style_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            prompt.push_str("\n\nBrand style: ");
            prompt.push_str(description);
        }

        prompt
    }
}

impl Default for StyleEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadEnhancer for StyleEnhancer {
    fn enhance(&self, request: &JobRequest) -> JobPayload {
        JobPayload {
            prompt: self.build_prompt(request),
            parameters: request.payload.parameters.clone(),
        }
    }
}
