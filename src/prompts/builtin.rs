// Built-in prompt templates

/// Built-in template names
pub const CLASSIFY_INTENT: &str = "classify_intent";
pub const SYNTHESIZE_COMPETITORS: &str = "synthesize_competitors";
pub const MARKET_OVERVIEW: &str = "market_overview";
pub const GAP_ANALYSIS: &str = "gap_analysis";
pub const DEFINE_PROBLEM: &str = "define_problem";

/// Get a specific built-in template
pub fn get_builtin_template(name: &str) -> Option<&'static str> {
    match name {
        CLASSIFY_INTENT => Some(CLASSIFY_INTENT_TEMPLATE),
        SYNTHESIZE_COMPETITORS => Some(SYNTHESIZE_COMPETITORS_TEMPLATE),
        MARKET_OVERVIEW => Some(MARKET_OVERVIEW_TEMPLATE),
        GAP_ANALYSIS => Some(GAP_ANALYSIS_TEMPLATE),
        DEFINE_PROBLEM => Some(DEFINE_PROBLEM_TEMPLATE),
        _ => None,
    }
}

/// List all built-in template names
pub fn list_builtin_templates() -> Vec<&'static str> {
    vec![
        CLASSIFY_INTENT,
        SYNTHESIZE_COMPETITORS,
        MARKET_OVERVIEW,
        GAP_ANALYSIS,
        DEFINE_PROBLEM,
    ]
}

// Template definitions

const CLASSIFY_INTENT_TEMPLATE: &str = r#"You are the intake classifier for a product research assistant. Decide what the user wants and, for research-worthy prompts, prepare the follow-up questions that sharpen the research direction.

## User Prompt
{{ prompt }}

## Intent Definitions
- "small_talk": greetings, thanks, chit-chat with no product content
- "off_topic": requests unrelated to researching, improving, or building a product
- "improve": the user wants to improve a product they already have
- "explore": the user wants to understand an existing market or product space
- "build": the user wants to build a new product and needs competitive research

## Your Task
1. Classify the prompt into exactly one intent.
2. For "improve", "explore" and "build": name the product domain under research as a short noun phrase (e.g. "note-taking apps"), plus a general-to-specific hierarchy for disambiguation (e.g. ["productivity software", "note-taking apps", "note-taking apps for students"]).
3. For "improve", "explore" and "build": write 2-4 clarification questions whose answers would change how the research is scoped (target platform, audience, pricing posture, and similar). Questions about facts already stated in the prompt are wasted questions.
4. For "small_talk" and "off_topic": write a one-or-two sentence quickResponse that politely answers and steers the user toward describing a product idea.

## Output Format
Output ONLY a valid JSON object with no additional text, no markdown formatting, and no trailing commas:

```json
{
  "intent": "small_talk|off_topic|improve|explore|build",
  "domain": "<product domain; empty string for small_talk/off_topic>",
  "domainHierarchy": ["<general>", "<more specific>", "<most specific>"],
  "quickResponse": "<reply for small_talk/off_topic; null otherwise>",
  "questions": [
    {
      "id": "<lowercase-slug>",
      "label": "<question text>",
      "options": [
        {
          "id": "<lowercase-slug>",
          "label": "<option label>",
          "description": "<one-line elaboration or null>"
        }
      ],
      "allowMultiple": true,
      "allowOther": false
    }
  ]
}
```

## Guidelines
- Question and option ids must be stable lowercase slugs (letters, digits, dashes only)
- "improve" applies only to the user's OWN existing product; researching someone else's product is "explore"
- questions must be an empty array for small_talk and off_topic
- quickResponse must be null for improve, explore and build
- Set allowMultiple true only where combining options is meaningful (e.g. platforms); set allowOther true where the option list cannot be exhaustive
"#;

const SYNTHESIZE_COMPETITORS_TEMPLATE: &str = r#"You are a competitive intelligence analyst. Synthesize raw multi-source evidence into clean competitor profiles.

## Research Target
**Domain**: {{ domain }}
{% if clarifications %}
**Research constraints**:
{{ clarifications }}
{% endif %}

## Raw Evidence
{% for candidate in candidates %}
- **{{ candidate.name }}** [{{ candidate.source }}]{% if candidate.url %} ({{ candidate.url }}){% endif %}: {{ candidate.snippet }}
{% endfor %}

## Your Task
Produce 3 to 8 competitor profiles for the domain, honoring the research constraints:

1. Merge duplicate mentions of the same product into a single profile
2. Keep only products that actually compete in the stated domain under the stated constraints
3. features and weaknesses must come from the evidence snippets, not general knowledge
4. pricing: summarize in one line if any snippet mentions it, otherwise null
5. redditSentiment: a one-line digest of forum-sourced snippets about the product, null when no forum evidence mentions it

## Output Format
Output ONLY a valid JSON object with no additional text, no markdown formatting, and no trailing commas:

```json
{
  "competitors": [
    {
      "name": "<product name>",
      "url": "<homepage url or null>",
      "description": "<one-paragraph positioning summary>",
      "features": ["<feature>", "<feature>"],
      "weaknesses": ["<concrete complaint>", "<concrete complaint>"],
      "pricing": "<pricing summary or null>",
      "redditSentiment": "<sentiment digest or null>"
    }
  ]
}
```

## Guidelines
- Never invent products that do not appear in the evidence
- Weaknesses should be concrete complaints users actually voice, not generic drawbacks
- Prefer fewer well-evidenced profiles over many thin ones
"#;

const MARKET_OVERVIEW_TEMPLATE: &str = r#"You are a market research analyst specializing in technology products and startups. Write a market overview grounded in the competitor profiles below.

## Research Target
**Domain**: {{ domain }}
{% if clarifications %}
**Research constraints**:
{{ clarifications }}
{% endif %}

## Competitor Profiles
{% for profile in profiles %}
### {{ profile.name }}{% if profile.url %} ({{ profile.url }}){% endif %}
{{ profile.description }}
- Features: {{ profile.features | join(sep=", ") }}
- Weaknesses: {{ profile.weaknesses | join(sep=", ") }}
- Pricing: {% if profile.pricing %}{{ profile.pricing }}{% else %}unknown{% endif %}
- Community sentiment: {% if profile.redditSentiment %}{{ profile.redditSentiment }}{% else %}none gathered{% endif %}
{% endfor %}

## Your Task
Write a market overview covering:

1. **Landscape**: how the profiled products split the market between them
2. **Table stakes**: features every serious product in this domain ships
3. **Differentiation axes**: where the products genuinely diverge (pricing, platform, audience)
4. **Sentiment themes**: what users consistently praise or complain about

## Output Format
Output ONLY a valid JSON object with no additional text, no markdown formatting, and no trailing commas:

```json
{
  "title": "<overview title naming the domain>",
  "content": "<multi-paragraph markdown overview>"
}
```

## Guidelines
- Cite only facts present in the profiles above; never fabricate sentiment, features, or pricing
- Name the specific products when making claims about them
- Keep the overview under 600 words
"#;

const GAP_ANALYSIS_TEMPLATE: &str = r#"You are a product strategist. Identify market gaps that are demonstrably unserved by the competitor set below.

## Research Target
**Domain**: {{ domain }}

## Competitor Profiles
{% for profile in profiles %}
### {{ profile.name }}
{{ profile.description }}
- Features: {{ profile.features | join(sep=", ") }}
- Weaknesses: {{ profile.weaknesses | join(sep=", ") }}
- Pricing: {% if profile.pricing %}{{ profile.pricing }}{% else %}unknown{% endif %}
- Community sentiment: {% if profile.redditSentiment %}{{ profile.redditSentiment }}{% else %}none gathered{% endif %}
{% endfor %}

## Your Task
Identify 2 to 5 market gaps. A gap qualifies only when the profile evidence supports it: a weakness shared across products, a user complaint no product addresses, or an audience every product ignores.

## Output Format
Output ONLY a valid JSON object with no additional text, no markdown formatting, and no trailing commas:

```json
{
  "gaps": [
    {
      "title": "<short gap name>",
      "description": "<what is missing and why it matters>",
      "evidence": [
        "<ProductName: the weakness or sentiment line supporting this gap>",
        "<OtherProduct: supporting line>"
      ],
      "opportunitySize": "high|medium|low"
    }
  ]
}
```

## Guidelines
- Every gap needs at least one evidence entry quoting or paraphrasing a specific profile field
- opportunitySize must be exactly one of high, medium, low
- A gap supported by a single product's weakness is "low" unless sentiment shows broad demand
- Do not propose gaps that contradict the evidence (e.g. a "missing feature" a profile lists as shipped)
"#;

const DEFINE_PROBLEM_TEMPLATE: &str = r#"You are a product strategist helping a founder turn validated market gaps into a problem statement worth building against.

## Research Target
**Domain**: {{ domain }}
{% if clarifications %}
**Research constraints**:
{{ clarifications }}
{% endif %}

## Selected Market Gaps
{% for gap in gaps %}
### {{ gap.title }} (opportunity: {{ gap.opportunitySize }})
{{ gap.description }}
Evidence:
{% for item in gap.evidence %}
- {{ item }}
{% endfor %}
{% endfor %}

## Competitive Context
{% for profile in profiles %}
- **{{ profile.name }}**: weaknesses: {{ profile.weaknesses | join(sep=", ") }}
{% endfor %}

## Your Task
Write one problem statement that the selected gaps collectively justify:

1. **title**: the problem in one sharp sentence
2. **content**: 2-4 markdown paragraphs describing who hurts, how products fail them today, and what an opening looks like
3. **targetUser**: the specific person or team with this problem
4. **keyDifferentiators**: 3-5 concrete ways a new product would beat the profiled competitors, ordered by importance
5. **validationQuestions**: 3-5 questions the founder should answer with real users before building

## Output Format
Output ONLY a valid JSON object with no additional text, no markdown formatting, and no trailing commas:

```json
{
  "title": "<problem statement title>",
  "content": "<multi-paragraph markdown>",
  "targetUser": "<specific user description>",
  "keyDifferentiators": ["<differentiator>", "<differentiator>"],
  "validationQuestions": ["<question>", "<question>"]
}
```

## Guidelines
- Ground every claim in the selected gaps and profile weaknesses; never fabricate evidence
- Differentiators must map to specific competitor weaknesses, not aspirations
- Validation questions should be answerable in a user interview, not market-sizing homework
"#;
