//! Prompt templates for the four pipeline stages.
//!
//! Document and answer text arriving here is already truncated by the
//! pipeline; templates only do the phrasing.

/// Instruction sent alongside an inline image/PDF payload.
pub const EXTRACT_TEXT: &str = "Analyze the provided document. Identify and extract only the main \
    body of the text. Exclude any prefatory content such as title pages, tables of contents, \
    introductions, prefaces, or forewords. Return only the core content of the document. If \
    there's no main body, return an empty string.";

/// Labels the classifier must answer with.
pub const LABEL_STUDY_MATERIAL: &str = "STUDY_MATERIAL";
pub const LABEL_QUESTION_PAPER: &str = "QUESTION_PAPER";

pub fn classify_document(document_excerpt: &str) -> String {
    format!(
        "Classify the following document into exactly one of two categories.\n\
         - {LABEL_STUDY_MATERIAL}: the document teaches or informs; it contains its own answers \
         and information.\n\
         - {LABEL_QUESTION_PAPER}: the document consists only of exam questions, with no answers \
         or teaching content.\n\n\
         DOCUMENT:\n---\n{document_excerpt}\n---"
    )
}

pub fn generate_questions(document_excerpt: &str, grade_level: &str) -> String {
    format!(
        "Based on the provided document, generate seven distinct exam-style questions suitable \
         for a public service promotion exam for an officer at the '{grade_level}' level in the \
         style of the National Youth Service Corps (NYSC).\n\n\
         The questions must be direct, require recalling specific information from the document, \
         and adhere to the specific formats shown in the examples below. Do not mention \"the \
         document\" in the questions. Use specific numbers in parentheses, like \"five (5)\" or \
         \"ten (10)\".\n\n\
         Here are examples of the required question format:\n\
         - \"As a Zonal Inspector, you observed some cases of rejection of corps members within \
         your zone, enumerate five (5) measures you will put in place to control such situations.\"\n\
         - \"Mention ten (10) Collaborating agencies during orientation course.\"\n\
         - \"Mention five (5) rights and privileges of a corps member during the service year.\"\n\
         - \"Differentiate between Secondment and Transfer of Service.\"\n\
         - \"Outline five (5) measures put in place by Management to ensure that only eligible \
         foreign trained graduates participate in the scheme.\"\n\
         - \"The Community Development Service (CDS) is one of the cardinal programmes of the \
         NYSC. Enumerate five (5) steps to be taken by a corps member in embarking on a CDS \
         project.\"\n\n\
         DOCUMENT CONTEXT:\n---\n{document_excerpt}\n---"
    )
}

pub fn extract_questions(document_excerpt: &str) -> String {
    format!(
        "The following document is an existing question paper. Extract up to seven of its \
         questions verbatim. Combine the parts of any multi-part question into a single question. \
         Do not invent new questions and do not answer them.\n\n\
         QUESTION PAPER:\n---\n{document_excerpt}\n---"
    )
}

fn evaluation_task() -> &'static str {
    "**Your Task:**\n\
     Provide a structured evaluation. The result must have exactly five fields:\n\
     1. \"confidence\": a number between 0 and 100 scoring the user's answer.\n\
     2. \"assessment\": a very brief, one-sentence summary explaining the confidence score.\n\
     3. \"comparison\": a concise paragraph comparing the user's answer to the key points. \
     Highlight what they got right and what they might have missed.\n\
     4. \"suggestion1\": a short and brief, exemplary answer to the question.\n\
     5. \"suggestion2\": a second, distinct, short and brief exemplary answer, approaching it \
     from a slightly different angle if possible."
}

/// Evaluation against an uploaded source document (study-material path).
pub fn evaluate_source_based(source_excerpt: &str, question: &str, user_answer: &str) -> String {
    format!(
        "You are an expert academic evaluator. Your task is to analyze a user's answer based on \
         a provided source text and a specific question. Never reference \"the source document\" \
         or \"the text\" in your response.\n\n\
         **Source Text:**\n---\n{source_excerpt}\n---\n\n\
         **Question:**\n{question}\n\n\
         **User's Answer:**\n---\n{user_answer}\n---\n\n\
         {task}",
        task = evaluation_task()
    )
}

/// Evaluation with no source available (question-paper path): general
/// knowledge plus live web search.
pub fn evaluate_grounded(question: &str, user_answer: &str) -> String {
    format!(
        "You are an expert academic evaluator. No source document is available for this \
         question, so judge the user's answer using your general knowledge together with live \
         web search results. Never reference \"the search results\" in your response.\n\n\
         **Question:**\n{question}\n\n\
         **User's Answer:**\n---\n{user_answer}\n---\n\n\
         {task}",
        task = evaluation_task()
    )
}
