use super::{in_step, step_error};
use crate::agents::{steps, QUESTION_ANSWERER};
use crate::context::RunContext;
use crate::problem::{Answer, Rule, StructuredProblem};
use crate::prompts;
use rosetta_error::{Error, ErrorKind, Result};
use rosetta_llm::{parse_structured, GenerateRequest, ReasoningModel};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerReply {
    pub success: bool,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

/// One answer per question, in question order.
pub async fn answer_questions<M: ReasoningModel>(
    model: &M,
    ctx: &RunContext,
    problem: &StructuredProblem,
    rules: &[Rule],
) -> Result<Vec<Answer>> {
    in_step(ctx, steps::ANSWER, async {
        let vocabulary = ctx.vocabulary().get();
        let request = GenerateRequest::json(
            QUESTION_ANSWERER,
            prompts::answering(problem, rules, &vocabulary),
        )
        .with_system(prompts::SOLVER_SYSTEM);
        let generation = ctx
            .cancellable(model.generate(request))
            .await
            .map_err(|e| step_error(ErrorKind::AnswerFailed, "steps::answer_questions", e))?;
        let reply: AnswerReply = parse_structured(&generation)?;

        let answers = collate(problem, reply)?;
        ctx.log().json("Answers", &answers);
        Ok(answers)
    })
    .await
}

fn collate(problem: &StructuredProblem, reply: AnswerReply) -> Result<Vec<Answer>> {
    let fail = |reason: String| {
        Err(Error::answer_failed(reason).with_operation("steps::answer_questions"))
    };

    if !reply.success {
        let explanation = if reply.explanation.trim().is_empty() {
            "answerer could not resolve the questions".to_string()
        } else {
            reply.explanation
        };
        return fail(explanation);
    }

    let mut by_id: HashMap<String, Answer> = HashMap::new();
    for answer in reply.answers {
        if problem.question(&answer.question_id).is_none() {
            tracing::warn!(question_id = %answer.question_id, "dropping answer to unknown question");
            continue;
        }
        by_id.entry(answer.question_id.clone()).or_insert(answer);
    }

    let mut answers = Vec::with_capacity(problem.questions.len());
    for question in &problem.questions {
        match by_id.remove(&question.id) {
            Some(answer) if !answer.answer.trim().is_empty() => answers.push(answer),
            Some(_) => return fail(format!("answer to {} is empty", question.id)),
            None => return fail(format!("no answer for question {}", question.id)),
        }
    }
    Ok(answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Confidence;

    fn problem() -> StructuredProblem {
        serde_json::from_value(serde_json::json!({
            "dataset": [{"id": "1", "foreignForm": "a", "english": "b"}],
            "questions": [
                {"id": "Q1", "type": "translate", "input": "x"},
                {"id": "Q2", "type": "translate", "input": "y"}
            ]
        }))
        .unwrap()
    }

    fn answer(id: &str, text: &str) -> Answer {
        Answer {
            question_id: id.into(),
            answer: text.into(),
            working_steps: String::new(),
            confidence: Confidence::High,
            confidence_reasoning: String::new(),
        }
    }

    fn reply(answers: Vec<Answer>) -> AnswerReply {
        AnswerReply {
            success: true,
            explanation: String::new(),
            answers,
        }
    }

    #[test]
    fn test_answers_follow_question_order() {
        let answers = collate(
            &problem(),
            reply(vec![answer("Q2", "y!"), answer("Q9", "?"), answer("Q1", "x!")]),
        )
        .unwrap();
        let ids: Vec<_> = answers.iter().map(|a| a.question_id.as_str()).collect();
        assert_eq!(ids, vec!["Q1", "Q2"]);
    }

    #[test]
    fn test_missing_or_empty_answer_fails() {
        let err = collate(&problem(), reply(vec![answer("Q1", "x!")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AnswerFailed);
        assert!(err.message().contains("Q2"));

        let err = collate(&problem(), reply(vec![answer("Q1", "x"), answer("Q2", " ")]))
            .unwrap_err();
        assert!(err.message().contains("empty"));
    }

    #[test]
    fn test_unresolvable_reply_fails_with_explanation() {
        let err = collate(
            &problem(),
            AnswerReply {
                success: false,
                explanation: "Q2 needs a tense rule we do not have".into(),
                answers: vec![],
            },
        )
        .unwrap_err();
        assert_eq!(err.message(), "Q2 needs a tense rule we do not have");
    }
}
