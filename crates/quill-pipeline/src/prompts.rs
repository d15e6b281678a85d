//! Prompt templates filled from the content configuration.

use quill_types::{LinkSet, MediaRef, ResearchDocument};

use crate::config::ContentConfig;

/// Links and images requested from the session service per item.
pub const MAX_LINKS: usize = 3;
pub const MAX_IMAGES: usize = 3;

/// Business context substituted into every prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBook {
    pub business_name: String,
    pub business_type: String,
    pub country: String,
    pub language: String,
    pub tone: String,
    pub page_type: String,
}

impl Default for PromptBook {
    fn default() -> Self {
        Self::from_config(&ContentConfig::default())
    }
}

impl PromptBook {
    pub fn from_config(config: &ContentConfig) -> Self {
        Self {
            business_name: config.get_or("business_name", "our company"),
            business_type: config.get_or("business_type", "business"),
            country: config.get_or("country", "the United States"),
            language: config.get_or("language", "English"),
            tone: config.get_or("tone", "informative"),
            page_type: config.get_or("page_type", "blog post"),
        }
    }

    /// System instructions for a newly created assistant.
    pub fn assistant_instructions(&self) -> String {
        format!(
            "You are an expert in writing SEO-optimized content for {name}, a {kind} in {country}. \
             Write fresh, specific content in clear {language} at a grade 7 reading level with a {tone} tone. \
             Use only the internal links and product images found in the attached files and never invent links. \
             Embed images and links using markdown.",
            name = self.business_name,
            kind = self.business_type,
            country = self.country,
            language = self.language,
            tone = self.tone,
        )
    }

    /// System instructions for the keyword research assistant.
    pub fn keyword_instructions(&self) -> String {
        format!(
            "You are an SEO expert. Your goal is to suggest the best keywords for a business called {name}. \
             It is a {kind} business aimed at consumers located in {country}. \
             The keywords must be in {language}. Prefer keywords with low SEO difficulty, high search volume \
             and low cost per click.",
            name = self.business_name,
            kind = self.business_type,
            country = self.country,
            language = self.language,
        )
    }

    pub fn visualization(&self, keyword: &str, research: Option<&ResearchDocument>) -> String {
        let data = research
            .map(ResearchDocument::to_prompt_text)
            .unwrap_or_else(|| "publicly known data on the topic".into());
        format!(
            "Use Code Interpreter - invent a visualization of some interesting data about \"{keyword}\" \
             from the research below and add the sources used for the visualization.\n\n{data}"
        )
    }

    pub fn links(&self, keyword: &str) -> String {
        format!(
            "Use file_search. Read the internal links file and choose up to {MAX_LINKS} pages of {name} \
             relevant to \"{keyword}\", listing their full URLs. Then read the brand images file and \
             choose {MAX_IMAGES} product images relevant to this article, listing their full URLs.",
            name = self.business_name,
        )
    }

    pub fn outline(
        &self,
        keyword: &str,
        research: Option<&ResearchDocument>,
        links: Option<&LinkSet>,
        visualizations: &[MediaRef],
    ) -> String {
        format!(
            "Create a concise outline for a {page_type} about \"{keyword}\".\n\
             - Include sources for the data from the research.\n\
             - Place the internal links and product images in appropriate sections; do not invent image links.\n\
             - Include these custom graphs: {graphs}\n\n\
             Research:\n{research}\n\n\
             Internal links and images:\n{links}",
            page_type = self.page_type,
            graphs = join_media(visualizations),
            research = research_text(research),
            links = links_text(links),
        )
    }

    pub fn compose(
        &self,
        keyword: &str,
        outline: &str,
        research: Option<&ResearchDocument>,
        links: Option<&LinkSet>,
        visualizations: &[MediaRef],
    ) -> String {
        format!(
            "Write a detailed, informative {page_type} of about 1500 words in {language} about \"{keyword}\", \
             following the outline below.\n\
             - Write with a {tone} tone, in the first-person plural for {name}.\n\
             - Use tables, lists, embedded images and internal links; only use the links listed here.\n\
             - Embed these graphs: {graphs}\n\n\
             Outline:\n{outline}\n\n\
             Research:\n{research}\n\n\
             Internal links and images:\n{links}",
            page_type = self.page_type,
            language = self.language,
            tone = self.tone,
            name = self.business_name,
            graphs = join_media(visualizations),
            research = research_text(research),
            links = links_text(links),
        )
    }

    pub fn keywords(&self, count: usize) -> String {
        format!(
            "Suggest {count} search keywords for {page_type} content by {name}, a {kind} in {country}. \
             Answer only with a list in the format [keyword 1, keyword 2, keyword 3].",
            page_type = self.page_type,
            name = self.business_name,
            kind = self.business_type,
            country = self.country,
        )
    }
}

fn join_media(visualizations: &[MediaRef]) -> String {
    if visualizations.is_empty() {
        return "none".into();
    }
    visualizations
        .iter()
        .map(MediaRef::url)
        .collect::<Vec<_>>()
        .join(" ")
}

fn research_text(research: Option<&ResearchDocument>) -> String {
    research
        .map(ResearchDocument::to_prompt_text)
        .unwrap_or_else(|| "(no research available)".into())
}

fn links_text(links: Option<&LinkSet>) -> String {
    match links {
        Some(set) if !set.urls.is_empty() => set.urls.join("\n"),
        Some(set) if !set.text.trim().is_empty() => set.text.clone(),
        _ => "(none)".into(),
    }
}
