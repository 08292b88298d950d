use std::collections::HashMap;

use crate::models::{Exam, SubmittedAnswer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeOutcome {
    pub score: f64,
    pub max_score: f64,
}

/// Marks an answer set against the exam key. Only the last answer per
/// question counts; answers to unknown questions are ignored.
pub fn grade_attempt(exam: &Exam, answers: &[SubmittedAnswer]) -> GradeOutcome {
    let mut latest: HashMap<&str, &str> = HashMap::with_capacity(answers.len());
    for answer in answers {
        latest.insert(answer.question_id.as_str(), answer.selected_option.as_str());
    }

    let score = exam
        .questions
        .iter()
        .filter(|q| latest.get(q.id.as_str()) == Some(&q.correct_option.as_str()))
        .map(|q| q.marks)
        .sum();

    GradeOutcome {
        score,
        max_score: exam.max_score(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Question;
    use chrono::Utc;

    fn question(id: &str, correct: &str, marks: f64) -> Question {
        Question {
            id: id.to_string(),
            prompt: format!("Question {}", id),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_option: correct.to_string(),
            marks,
        }
    }

    fn exam() -> Exam {
        Exam {
            id: "exam-1".to_string(),
            title: "Algebra".to_string(),
            subject_id: "math".to_string(),
            term_id: "2024-1".to_string(),
            duration_minutes: 30,
            questions: vec![question("q1", "a", 30.0), question("q2", "b", 42.0), question("q3", "c", 28.0)],
            created_by: "t-1".to_string(),
            created_at: Utc::now(),
        }
    }

    fn answer(q: &str, option: &str) -> SubmittedAnswer {
        SubmittedAnswer {
            question_id: q.to_string(),
            selected_option: option.to_string(),
        }
    }

    #[test]
    fn sums_marks_of_correct_answers() {
        let outcome = grade_attempt(&exam(), &[answer("q1", "a"), answer("q2", "b"), answer("q3", "a")]);
        assert_eq!(outcome.score, 72.0);
        assert_eq!(outcome.max_score, 100.0);
    }

    #[test]
    fn last_answer_wins() {
        let outcome = grade_attempt(&exam(), &[answer("q1", "a"), answer("q1", "c")]);
        assert_eq!(outcome.score, 0.0);
        let outcome = grade_attempt(&exam(), &[answer("q1", "c"), answer("q1", "a")]);
        assert_eq!(outcome.score, 30.0);
    }

    #[test]
    fn unknown_questions_are_ignored() {
        let outcome = grade_attempt(&exam(), &[answer("q9", "a"), answer("q3", "c")]);
        assert_eq!(outcome.score, 28.0);
    }

    #[test]
    fn empty_answer_set_scores_zero() {
        assert_eq!(grade_attempt(&exam(), &[]).score, 0.0);
    }
}
