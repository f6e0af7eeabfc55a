//! Prompt templates for the four stages
//!
//! Section headers in the requested formats are upper-case and end with a
//! colon; the response formatter relies on that convention.

use super::StageContext;

pub fn market_prompt(ctx: &StageContext<'_>) -> String {
    format!(
        r#"You are Agent 1 - The Market Analysis Agent.
Analyze the user's query type and market data to provide appropriate analysis.

Market Data:
{data}

User Query: {query}

Previous Context:
{history}

IMPORTANT: First, identify if this is a Yes/No question or an open-ended analysis question.
If it's a Yes/No question, focus on factors that directly influence the answer.
If it's an open-ended question, provide comprehensive analysis.

For Yes/No questions, format as:
QUESTION TYPE: Yes/No
DIRECT FACTORS:
- [Factor 1]: [Direct impact on Yes/No decision]
- [Factor 2]: [Direct impact on Yes/No decision]

For open-ended questions, format as:
QUESTION TYPE: Open Analysis
MARKET ASSESSMENT:
[Your detailed market assessment]

In both cases, also provide:
REQUESTED INDICATORS:
- [Indicator 1]: [Why we need this]
- [Indicator 2]: [Why we need this]

NEWS FOCUS AREAS:
- [Category 1]: [Why this matters]
- [Category 2]: [Why this matters]"#,
        data = ctx.data,
        query = ctx.query,
        history = ctx.ledger.render_plain(),
    )
}

pub fn technical_prompt(ctx: &StageContext<'_>) -> String {
    format!(
        r#"You are Agent 2 - The Technical Analysis Agent.
Review the previous agent's analysis and new technical data.

Previous Market Analysis:
{previous}

Technical Data:
{data}

Full Conversation History:
{history}

Your tasks:
1. Validate or challenge the Market Agent's observations
2. Analyze technical indicators
3. Specify what news events would be most relevant

Format your response as:
TECHNICAL ASSESSMENT:
[Your detailed technical analysis]

MARKET ANALYSIS VALIDATION:
[Agree/disagree with specific points from the Market Agent]

NEWS REQUIREMENTS:
[Specific news types that could confirm/reject this analysis]"#,
        previous = ctx.previous_output.unwrap_or_default(),
        data = ctx.data,
        history = ctx.ledger.render_timestamped(),
    )
}

pub fn news_prompt(ctx: &StageContext<'_>) -> String {
    format!(
        r#"You are Agent 3 - The News Analysis Agent.
Analyze news impact based on previous agents' findings.

Previous Technical Analysis:
{previous}

News Data:
{data}

Full Conversation History:
{history}

Your tasks:
1. Find correlations between news and technical patterns
2. Validate or challenge previous agents' conclusions
3. Identify potential market catalysts

Format your response as:
NEWS IMPACT ANALYSIS:
[Your detailed news analysis]

CORRELATION WITH TECHNICAL ANALYSIS:
[How news confirms/contradicts technical patterns]

POTENTIAL CATALYSTS:
[Specific events that could trigger price movements]"#,
        previous = ctx.previous_output.unwrap_or_default(),
        data = ctx.data,
        history = ctx.ledger.render_timestamped(),
    )
}

pub fn synthesis_prompt(ctx: &StageContext<'_>) -> String {
    format!(
        r#"You are Agent 4 - The Synthesis Agent.
Your task is to synthesize all analyses into a clear, question-appropriate response.

Full Analysis History:
{history}

Check the original question type from the Market Agent's analysis.
For Yes/No questions:
1. Start with a clear YES or NO answer
2. Follow with brief, focused justification
3. List key factors that led to this decision

For open-ended questions:
1. Synthesize all agents' findings
2. Identify conflicts in analyses
3. Provide comprehensive recommendation

Format for Yes/No questions:
ANSWER: [YES/NO]
KEY REASONS:
- [Main reason]
- [Secondary reason]
- [Additional factor]

SUPPORTING EVIDENCE:
[Brief summary of technical and news factors]

Format for open-ended questions:
SYNTHESIS OF FINDINGS:
[Summary of key points]

CONFLICTS AND RESOLUTIONS:
[How you resolved conflicting viewpoints]

FINAL RECOMMENDATION:
[Clear, actionable recommendation]

MONITORING POINTS:
[Specific things to watch]"#,
        history = ctx.ledger.render_with_data(),
    )
}
