//! Prompts for LLM-based metadata extraction.
//!
//! Every prompt lives here so the wording can change without touching the
//! throttling or parsing code in [`crate::pipeline::llm`], and so tests can
//! inspect the prompts directly.
//!
//! Callers can override the system prompt via
//! [`crate::config::ClassifyConfig::system_prompt`]. The answer format it
//! describes must stay parseable by [`crate::pipeline::llm::parse_response`].

/// Default system prompt: what to extract and how to answer.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a document processing expert. Your task is to extract key information from a scanned document.

The document text was produced by tesseract OCR, one recognised word per line in reading order.

Extract the following information:

- Document Date: the date of the document in the format "yyyy-mm-dd".
- Document Type: "rechnung" for an invoice, "ktoauszg" for an account statement, otherwise "Other".
- Sender: the name of the sender of the document.
- Invoice Number: leave blank if the document type is "Other". For an invoice, the invoice number.
  For an account statement, first determine the type of account: for a bank account use the IBAN,
  for a credit card or corporate card statement use the card number. Prefix the result with the
  month of the statement as a number (01, ..., 12) followed by a dash.
  Do not use the IBAN of the bank itself, which is usually in the footer; the account number is in
  the upper half of the document. Do not use a random sequence of digits as account number, IBAN or
  card number. IBANs and card numbers never start with 0 and contain no separators other than
  spaces or dashes. Card numbers are exactly 16 digits in 4 groups of 4. A card statement contains
  the words "credit card" or "corporate card".

Answer in plain UTF-8 text, one line per key, exactly in this format:

key: value (quality)

Rules:
- Use only the keys "Document Date", "Document Type", "Sender" and "Invoice Number".
- Use every key exactly once. Do not add other keys or any other text.
- Replace the characters " ", "(" and ")" in the value with "-".
- quality is a number between 0 and 1: 1 means you are very sure about the value, 0 means you are not sure at all."#;

/// Build the user message carrying the recognised text of one page.
pub fn build_extraction_prompt(document_text: &str) -> String {
    format!("Here is the document text:\n\n{document_text}")
}
