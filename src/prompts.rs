//! Prompt construction for the categorizer and writer.

use crate::workflow::state::Category;

/// System prompt for the email categorizer.
pub fn categorizer_system_prompt() -> String {
    "You are a customer support specialist who categorizes incoming emails.\n\n\
     Categories:\n\
     - \"product_enquiry\": the email asks about a product feature, benefit, service, or pricing.\n\
     - \"customer_complaint\": the email communicates dissatisfaction or a complaint.\n\
     - \"customer_feedback\": the email provides feedback or suggestions about a product or service.\n\
     - \"unrelated\": the email matches none of the above.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"category\": \"...\"}\n\n\
     Base the categorization strictly on the email content provided; do not assume or overgeneralize."
        .to_string()
}

/// User prompt for the categorizer.
pub fn categorizer_user_prompt(email_body: &str) -> String {
    format!("EMAIL CONTENT:\n{email_body}")
}

/// System prompt for the first (tool-enabled) drafting pass.
///
/// The category allow-list for retrieval is a soft constraint: it is stated
/// here, not enforced by the router.
pub fn writer_system_prompt() -> String {
    "You are a customer support representative drafting reply emails.\n\n\
     Rules:\n\
     - If the category is product_enquiry or customer_complaint, call the \
       search_knowledge_base tool to look up product and policy information \
       before answering. Do NOT answer product questions from memory.\n\
     - For any other category, do NOT call the tool; write the reply directly.\n\
     - Acknowledge the customer's message, address their specific points, and \
       keep a helpful, professional tone.\n\
     - If you lack specific information, say so and offer to connect them \
       with the right team."
        .to_string()
}

/// System prompt for the second (structured) drafting pass.
pub fn writer_structured_system_prompt() -> String {
    format!(
        "{}\n\n\
         Respond with ONLY a JSON object:\n\
         {{\"subject\": \"...\", \"body\": \"...\"}}\n\n\
         The subject should be a clear, professional reply subject line. The \
         body is the complete reply email text.",
        writer_system_prompt()
    )
}

/// User prompt shared by both drafting passes.
pub fn writer_user_prompt(category: Category, email_body: &str, context: &str) -> String {
    let mut prompt = String::with_capacity(256 + email_body.len() + context.len());
    prompt.push_str(&format!("Email category: {}\n", category.label()));
    prompt.push_str(&format!("Original email:\n{email_body}\n"));
    if context.is_empty() {
        prompt.push_str("Additional context: (none)\n");
    } else {
        prompt.push_str(&format!("Additional context:\n{context}\n"));
    }
    prompt
}
