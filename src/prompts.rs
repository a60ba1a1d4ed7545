//! Prompt text for structured medical extraction.
//!
//! Every instruction sent to a model lives here so a change to the requested
//! schema touches one file, and unit tests can assert on the exact wording
//! without a live model.

/// Top-level keys the extraction prompt asks the model to return.
///
/// These are requested, not enforced: whatever the model returns is passed
/// through to the client.
pub const ENTITY_FIELDS: [&str; 8] = [
    "name",
    "age",
    "disease",
    "values",
    "doctorInfo",
    "patientVitals",
    "prescriptions",
    "notes",
];

/// Instruction template. `{ocr_text}` is replaced with the document text.
pub const EXTRACTION_PROMPT_TEMPLATE: &str = r#"Extract structured medical information from the following OCR text.
Return a valid JSON object with these fields:
- "name": Patient's full name (string)
- "age": Patient's age (integer or string)
- "disease": Primary disease or condition diagnosed (string)
- "values": A dictionary of lab/test values with their units (e.g., {"Hemoglobin": "14 g/dL"})
- "doctorInfo": A dictionary with the doctor's details ("name", "clinic", "address", "phone")
- "patientVitals": A dictionary of vitals ("weight", "bloodPressure", "temperature", "pulse", "height", "bmi")
- "prescriptions": A list of dictionaries, where each contains {"medication", "dosage", "timings", "duration"}
- "notes": Any additional clinical notes or advice (string)

OCR Text:
---
{ocr_text}
---

Return valid JSON only. If a field is not present, use null or an empty structure (e.g., [], {}, "")."#;

/// System instruction for providers without a native JSON response mode.
pub const JSON_ONLY_SYSTEM_PROMPT: &str = "You are a medical records assistant. \
Respond with a single JSON object and nothing else: no prose, no Markdown fences.";

/// Build the extraction prompt with `text` embedded verbatim.
pub fn build_extraction_prompt(text: &str) -> String {
    // Single replacement: OCR text containing "{ocr_text}" must stay literal.
    match EXTRACTION_PROMPT_TEMPLATE.split_once("{ocr_text}") {
        Some((head, tail)) => format!("{head}{text}{tail}"),
        None => EXTRACTION_PROMPT_TEMPLATE.to_string(),
    }
}
