//! Prompt templates for the completion model.
//!
//! Every prompt is plain text assembled from three parts: optional grounding
//! context (retrieved documents or prior conversation), the user's question,
//! and a Markdown tutorial template telling the model how to shape the answer.

use crate::models::{ChatMessage, Document};

const GROUNDED_TUTORIAL: &str = "\
Please generate a comprehensive tutorial in Markdown format based on the documentation above. \
Structure your response as follows:\n\n\
# [Topic Name] Tutorial\n\n\
## Overview\n[Brief 2-3 sentence explanation of the topic]\n\n\
## What You'll Learn\n- [Learning objective 1]\n- [Learning objective 2]\n- [Learning objective 3]\n\n\
## Prerequisites\n- [Prerequisite 1]\n- [Prerequisite 2]\n\n\
## Step-by-Step Guide\n\n\
### Step 1: [First Step]\n[Detailed explanation with examples]\n\n\
### Step 2: [Second Step]\n[Detailed explanation with examples]\n\n\
### Step 3: [Third Step]\n[Detailed explanation with examples]\n\n\
## Code Examples\n\n\
### Basic Example\n```[language]\n[Code example here]\n```\n\n\
### Advanced Example\n```[language]\n[More complex code example]\n```\n\n\
## Best Practices\n- [Best practice 1]\n- [Best practice 2]\n- [Best practice 3]\n\n\
## Common Pitfalls to Avoid\n- [Pitfall 1]\n- [Pitfall 2]\n\n\
## Summary\n[Brief summary of what was covered]\n\n\
## Next Steps\n- [What to learn next 1]\n- [What to learn next 2]\n\n\
Keep the tutorial comprehensive, well-structured, and beginner-friendly. \
Use proper Markdown formatting with headers, code blocks, and bullet points.";

const GENERAL_TUTORIAL: &str = "\
Please provide a helpful and informative tutorial in Markdown format about this topic. \
If you don't have specific information, provide general guidance and suggest where they \
might find more detailed information.\n\n\
Structure your response as a well-formatted Markdown tutorial with:\n\n\
# [Topic Name]\n\n\
## Overview\n[Brief explanation]\n\n\
## Key Concepts\n- [Concept 1]\n- [Concept 2]\n\n\
## Getting Started\n[Basic steps]\n\n\
## Examples\n[Practical examples]\n\n\
## Resources\n[Where to learn more]\n\n\
Use proper Markdown formatting with headers, code blocks, and bullet points.";

const FOLLOW_UP_GROUNDED: &str = "\
Please generate a short, focused tutorial in Markdown format based on the documentation above. \
Consider the conversation history for context. Structure your response as follows:\n\n\
# Quick Tutorial: [Topic Name]\n\n\
## What is [Topic]?\n[Brief 1-2 sentence explanation]\n\n\
## Key Concepts:\n- [Concept 1]\n- [Concept 2]\n- [Concept 3]\n\n\
## Basic Example:\n```[language]\n[Provide a simple, practical example]\n```\n\n\
## Common Use Cases:\n- [Use case 1]\n- [Use case 2]\n\n\
## Tips:\n- [Tip 1]\n- [Tip 2]\n\n\
Keep the tutorial concise, practical, and beginner-friendly. Use proper Markdown formatting.";

const FOLLOW_UP_GENERAL: &str = "\
Please provide a helpful and informative tutorial in Markdown format about this topic. \
Consider the conversation history for context. If you don't have specific information, \
provide general guidance and suggest where they might find more detailed information.\n\n\
Structure your response as a well-formatted Markdown tutorial with proper headers, \
code blocks, and bullet points.";

/// Join `"Title: …\nContent: …"` blocks behind a preamble, followed by a
/// blank line. Empty when there is nothing to ground on.
fn grounding(preamble: &str, blocks: &[String]) -> String {
    if blocks.is_empty() {
        return String::new();
    }
    format!("{}\n\n{}\n\n", preamble, blocks.join("\n\n"))
}

/// Context blocks for a set of documents.
pub fn context_blocks(docs: &[Document]) -> Vec<String> {
    docs.iter().map(Document::context_block).collect()
}

/// Prompt for a single-turn chat.
///
/// With context the model is asked for a full tutorial grounded on it;
/// without, for general guidance.
pub fn chat(context: &[String], question: &str) -> String {
    if context.is_empty() {
        format!("User Question: {}\n\n{}", question, GENERAL_TUTORIAL)
    } else {
        format!(
            "{}User Question: {}\n\n{}",
            grounding("Based on the following relevant documentation:", context),
            question,
            GROUNDED_TUTORIAL
        )
    }
}

/// Prompt for a chat turn that carries prior conversation.
pub fn follow_up(history: &[ChatMessage], context: &[String], question: &str) -> String {
    let mut prompt = String::new();

    if !history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for msg in history {
            prompt.push_str(&format!("{}: {}\n", msg.role, msg.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&grounding(
        "Based on the following relevant documentation:",
        context,
    ));
    prompt.push_str(&format!("Current user question: {}\n\n", question));
    prompt.push_str(if context.is_empty() {
        FOLLOW_UP_GENERAL
    } else {
        FOLLOW_UP_GROUNDED
    });
    prompt
}

/// Long-form tutorial over scraped documents.
pub fn complete_tutorial(context: &[String], topic: &str) -> String {
    format!(
        "{}Generate a comprehensive tutorial for: {topic}\n\n\
         Please create a well-structured tutorial in Markdown format based on the scraped \
         documentation above. Structure your response as follows:\n\n\
         # Complete Tutorial: {topic}\n\n\
         ## Overview\n[Provide a clear, concise overview of the topic]\n\n\
         ## Prerequisites\n[List any prerequisites or basic knowledge needed]\n\n\
         ## Step-by-Step Guide\n\n\
         ### Step 1: [First Step]\n[Detailed explanation with examples]\n\n\
         ### Step 2: [Second Step]\n[Detailed explanation with examples]\n\n\
         ### Step 3: [Third Step]\n[Detailed explanation with examples]\n\n\
         ## Code Examples\n\n\
         ### Basic Example\n```[language]\n[Provide practical code examples]\n```\n\n\
         ### Advanced Example\n```[language]\n[More complex examples]\n```\n\n\
         ## Best Practices\n- [Best practice 1]\n- [Best practice 2]\n- [Best practice 3]\n\n\
         ## Common Pitfalls to Avoid\n- [Pitfall 1]\n- [Pitfall 2]\n\n\
         ## Summary\n[Brief summary of what was covered]\n\n\
         ## Next Steps\n[Suggest what to learn next]\n\n\
         Make the tutorial comprehensive yet easy to follow, with practical examples and clear \
         explanations. Use proper Markdown formatting.",
        grounding("Based on the following scraped documentation:", context),
        topic = topic,
    )
}

/// Short tutorial over scraped documents.
pub fn quick_tutorial(context: &[String], topic: &str) -> String {
    format!(
        "{}Generate a quick tutorial for: {topic}\n\n\
         Please create a concise tutorial in Markdown format based on the scraped documentation \
         above. Structure your response as follows:\n\n\
         # Quick Tutorial: {topic}\n\n\
         ## What is {topic}?\n[Brief explanation]\n\n\
         ## Key Concepts:\n- [Concept 1]\n- [Concept 2]\n- [Concept 3]\n\n\
         ## Basic Example:\n```[language]\n[Simple, practical example]\n```\n\n\
         ## Common Use Cases:\n- [Use case 1]\n- [Use case 2]\n\n\
         ## Tips:\n- [Tip 1]\n- [Tip 2]\n\n\
         Keep it concise and practical for beginners. Use proper Markdown formatting.",
        grounding("Based on the following scraped documentation:", context),
        topic = topic,
    )
}

pub fn scrape_queued_notice(topic: &str) -> String {
    format!(
        "I've queued a scraping job for {}. The tutorial will be generated once the content \
         is scraped and processed. Please try again in a few minutes.",
        topic
    )
}

pub fn scrape_pending_notice(topic: &str) -> String {
    format!(
        "I'm scraping content for {}. The tutorial will be available shortly. \
         Please try again in a few minutes.",
        topic
    )
}

/// Cut `s` to at most `max` characters, ending in `...` when shortened.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_chat_prompt_grounded() {
        let doc = Document::new("d1", "Flexbox", "Lay things out in a row.", "CSS");
        let prompt = chat(&context_blocks(&[doc]), "how do I center a div?");
        assert!(prompt.starts_with("Based on the following relevant documentation:\n\n"));
        assert!(prompt.contains("Title: Flexbox\nContent: Lay things out in a row."));
        assert!(prompt.contains("User Question: how do I center a div?"));
        assert!(prompt.contains("# [Topic Name] Tutorial"));
    }

    #[test]
    fn test_chat_prompt_ungrounded() {
        let prompt = chat(&[], "what is rust?");
        assert!(prompt.starts_with("User Question: what is rust?"));
        assert!(prompt.contains("If you don't have specific information"));
        assert!(!prompt.contains("Based on the following"));
    }

    #[test]
    fn test_follow_up_includes_history_in_order() {
        let history = vec![
            ChatMessage::new(Role::User, "what is css?"),
            ChatMessage::new(Role::Assistant, "a styling language"),
        ];
        let prompt = follow_up(&history, &[], "and grid?");
        assert!(prompt.starts_with(
            "Previous conversation:\nuser: what is css?\nassistant: a styling language\n\n"
        ));
        assert!(prompt.contains("Current user question: and grid?\n\n"));
        assert!(prompt.ends_with("code blocks, and bullet points."));
    }

    #[test]
    fn test_follow_up_without_history_has_no_preamble() {
        let prompt = follow_up(&[], &["Title: A\nContent: B".into()], "q");
        assert!(prompt.starts_with("Based on the following relevant documentation:"));
        assert!(prompt.contains("# Quick Tutorial: [Topic Name]"));
    }

    #[test]
    fn test_tutorial_templates_name_topic() {
        let ctx = vec!["Title: Grid\nContent: Two dimensions.".to_string()];
        let full = complete_tutorial(&ctx, "CSS Grid");
        assert!(full.starts_with("Based on the following scraped documentation:"));
        assert!(full.contains("# Complete Tutorial: CSS Grid"));

        let quick = quick_tutorial(&ctx, "CSS Grid");
        assert!(quick.contains("## What is CSS Grid?"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 50), "short");
        let long = "x".repeat(60);
        let cut = truncate(&long, 50);
        assert_eq!(cut.chars().count(), 50);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate(&"y".repeat(50), 50), "y".repeat(50));
    }
}
