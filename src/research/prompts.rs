//! Oracle task prompt templates
//!
//! One prompt per oracle task. Each prompt restates the task payload and
//! pins the exact JSON shape the response parser expects, so that a
//! well-behaved model answers with a single structured block.

use chrono::Utc;
use serde_json::Value;

use crate::oracle::{OracleRequest, OracleTask};

/// Prompt templates for the research loop
pub struct ResearchPrompts;

impl ResearchPrompts {
    fn current_date() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    fn pretty(payload: &Value) -> String {
        serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
    }

    /// Agent preamble shared by every task
    pub fn preamble() -> String {
        format!(
            r#"You are a senior technical due diligence analyst.

For context, today's date is {date}.

You evaluate companies for investors against weighted criteria in four
categories: technical, market, business and team. You are precise, you never
invent facts, and you always answer with a single JSON object matching the
schema you are given. Do not wrap the JSON in commentary."#,
            date = Self::current_date()
        )
    }

    /// Render the prompt for any oracle request
    pub fn render(request: &OracleRequest) -> String {
        match request.task {
            OracleTask::Decompose => Self::decompose(&request.payload),
            OracleTask::Extract => Self::extract(&request.payload),
            OracleTask::Reflect => Self::reflect(&request.payload),
            OracleTask::Synthesize => Self::synthesize(&request.payload),
        }
    }

    /// Break a research goal into weighted, categorized questions
    pub fn decompose(payload: &Value) -> String {
        format!(
            r#"# Task: Decompose the research goal

## Goal
{goal}

## Instructions
- Produce between 15 and 20 specific, answerable research questions.
- Cover all four categories: technical, market, business, team.
- Every category that has criteria needs at least one "critical" question.
- Emphasise the thesis focus areas.
- When a question evaluates a criterion, name it in "criterion".

## Response schema
{{"questions": [{{"text": "...", "category": "technical|market|business|team", "priority": "critical|high|medium|low", "criterion": "optional criterion name"}}]}}"#,
            goal = Self::pretty(payload)
        )
    }

    /// Score one evidence item against one question
    pub fn extract(payload: &Value) -> String {
        format!(
            r#"# Task: Extract evidence

## Input
{input}

## Instructions
Rate how relevant the content is to the question, from 0.0 (unrelated) to
1.0 (directly answers it). Summarise only what the content states about the
question, in at most three sentences.

## Response schema
{{"relevance": 0.0, "summary": "..."}}"#,
            input = Self::pretty(payload)
        )
    }

    /// Identify knowledge gaps once no batch can be selected
    pub fn reflect(payload: &Value) -> String {
        format!(
            r#"# Task: Reflect on research progress

## Current state
{state}

## Instructions
Identify the knowledge gaps that block an investment recommendation. For each
gap give its category, an importance of "critical", "high" or "medium", and up
to two concrete search queries that would close it. Do not repeat questions
that already exist.

## Response schema
{{"gaps": [{{"description": "...", "category": "technical|market|business|team", "importance": "critical|high|medium", "follow_up_queries": ["..."]}}]}}"#,
            state = Self::pretty(payload)
        )
    }

    /// Write the executive summary of the final report
    pub fn synthesize(payload: &Value) -> String {
        format!(
            r#"# Task: Executive summary

## Scored analysis
{analysis}

## Instructions
Write a concise executive summary (at most two paragraphs) for an investment
committee. Lead with the recommendation, support it with the strongest
category highlights and state the main risks. Cite findings with their
bracketed numbers where given.

## Response schema
{{"executive_summary": "..."}}"#,
            analysis = Self::pretty(payload)
        )
    }
}
