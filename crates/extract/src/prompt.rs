pub fn build_extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract entities and relationships from the following text.

INSTRUCTIONS:
1. Identify key entities (people, organizations, locations, events, dates, figures)
2. Extract every factual relationship between entities stated in the text
3. Output ONLY valid JSON, nothing else
4. Use the exact schema below

SCHEMA:
{{
  "entities": [
    {{"id": "E1", "name": "EntityName", "type": "PERSON|ORGANIZATION|LOCATION|EVENT|CONCEPT", "attributes": {{"key": "value"}}}}
  ],
  "relations": [
    {{"source": "E1", "target": ["E2", "E3"], "relation": "relationship_type", "evidence": "quote from text", "attributes": {{"date": "YYYY-MM-DD"}}}}
  ]
}}

RULES:
- Use sequential IDs: E1, E2, E3, etc.
- "source" and "target" may be a single ID or a list of IDs
- Use entity names exactly as written in the text
- Evidence must be a direct quote from the text
- Put dates, amounts and other qualifiers in "attributes"
- Output ONLY the JSON object, no markdown, no explanations

TEXT:
{}

JSON OUTPUT:"#,
        text
    )
}

/// Wraps the role prompt for the judgment step around an evidence block.
pub fn build_judge_prompt(role: &str, block: &str) -> String {
    format!(
        r#"{}

{}

VERDICT:"#,
        role.trim(),
        block
    )
}

pub const ANSWERER_ROLE: &str = r#"You are a careful fact checker answering a user's question.
Use ONLY the knowledge listed under [Evidence]. Cite evidence lines by their [N] marker.
If the evidence does not settle the question, say so explicitly."#;

pub const VERIFIER_ROLE: &str = r#"You are a news fact checker.
Compare the claims in [Source] with the knowledge listed under [Evidence].
For each claim state SUPPORTED, CONTRADICTED or UNVERIFIED, citing evidence lines by their [N] marker,
then give an overall verdict on whether the article is trustworthy."#;
