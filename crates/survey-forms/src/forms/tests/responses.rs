use super::common::*;
use crate::forms::domain::{Answer, AnswerValue, FormId};
use crate::forms::error::FormError;
use crate::forms::repository::ResponseRepository;
use crate::forms::survey::SubmissionRequest;

fn submission(form_id: &FormId, step_number: u32, answers: Vec<Answer>) -> SubmissionRequest {
    SubmissionRequest {
        email: "ada@example.com".to_string(),
        form_id: form_id.clone(),
        step_number,
        responses: answers,
        target_id: None,
    }
}

#[test]
fn batches_merge_into_one_record() {
    let h = harness();
    let (form, q1, q2) = h.two_step_form();

    h.aggregator
        .save_response("ada@example.com", &form.id, 1, vec![Answer::new(q1.id.clone(), "yes")])
        .expect("first batch");
    h.aggregator
        .save_response(
            "ada@example.com",
            &form.id,
            1,
            vec![Answer::new(q1.id.clone(), "no")],
        )
        .expect("overwrite");
    let saved = h
        .aggregator
        .save_response("ada@example.com", &form.id, 2, vec![Answer::new(q2.id.clone(), "yes")])
        .expect("second batch");

    assert_eq!(saved.responses.len(), 2);
    assert_eq!(saved.answer(&q1.id), Some(&AnswerValue::from("no")));
    assert_eq!(saved.answer(&q2.id), Some(&AnswerValue::from("yes")));

    let stored = h.store.responses_for_form(&form.id).expect("listed");
    assert_eq!(stored.len(), 1);
}

#[test]
fn current_step_never_moves_backwards() {
    let h = harness();
    let form = h.form("Long");
    for order in 1..=4 {
        h.step(&form.id, order);
    }

    h.aggregator
        .save_response("ada@example.com", &form.id, 3, Vec::new())
        .expect("step three");
    let saved = h
        .aggregator
        .save_response("ada@example.com", &form.id, 2, Vec::new())
        .expect("back to two");

    assert_eq!(saved.current_step, 3);
    assert!(!saved.is_completed);
}

#[test]
fn completion_is_sticky() {
    let h = harness();
    let (form, q1, q2) = h.two_step_form();

    let first = h
        .survey
        .submit(submission(&form.id, 1, vec![Answer::new(q1.id.clone(), "yes")]))
        .expect("step one");
    assert_eq!((first.current_step, first.is_completed), (1, false));

    let last = h
        .survey
        .submit(submission(&form.id, 2, vec![Answer::new(q2.id.clone(), "no")]))
        .expect("step two");
    assert_eq!((last.current_step, last.is_completed), (2, true));

    let completed_at = h
        .store
        .fetch_response("ada@example.com", &form.id)
        .expect("fetch")
        .and_then(|response| response.completed_at)
        .expect("completion stamped");

    let again = h
        .survey
        .submit(submission(&form.id, 1, vec![Answer::new(q1.id.clone(), "no")]))
        .expect("resubmit step one");
    assert_eq!((again.current_step, again.is_completed), (2, true));

    let stored = h
        .store
        .fetch_response("ada@example.com", &form.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.completed_at, Some(completed_at));
    assert_eq!(stored.answer(&q1.id), Some(&AnswerValue::from("no")));
}

#[test]
fn form_without_steps_never_completes() {
    let h = harness();
    let form = h.form("Empty");

    let saved = h
        .aggregator
        .save_response("ada@example.com", &form.id, 5, Vec::new())
        .expect("saved");
    assert!(!saved.is_completed);
}

#[test]
fn submission_validates_input() {
    let h = harness();
    let (form, _, _) = h.two_step_form();

    let mut bad_email = submission(&form.id, 1, Vec::new());
    bad_email.email = "not-an-email".to_string();
    assert!(matches!(
        h.survey.submit(bad_email),
        Err(FormError::Validation(_))
    ));

    assert!(matches!(
        h.survey.submit(submission(&form.id, 0, Vec::new())),
        Err(FormError::Validation(_))
    ));

    assert!(matches!(
        h.survey.submit(submission(&FormId::from("missing"), 1, Vec::new())),
        Err(FormError::FormNotFound)
    ));
}

#[test]
fn resume_returns_only_incomplete_responses() {
    let h = harness();
    let (form, q1, q2) = h.two_step_form();

    assert!(matches!(
        h.survey.resume("ada@example.com", None),
        Err(FormError::ResponseNotFound)
    ));

    h.survey
        .submit(submission(&form.id, 1, vec![Answer::new(q1.id.clone(), "yes")]))
        .expect("partial");
    let partial = h
        .survey
        .resume("ada@example.com", None)
        .expect("resumable on the active form");
    assert_eq!(partial.current_step, 1);

    let explicit = h
        .survey
        .resume("ada@example.com", Some(form.id.clone()))
        .expect("resumable by id");
    assert_eq!(explicit.id, partial.id);

    h.survey
        .submit(submission(&form.id, 2, vec![Answer::new(q2.id.clone(), "yes")]))
        .expect("complete");
    assert!(matches!(
        h.survey.resume("ada@example.com", Some(form.id.clone())),
        Err(FormError::ResponseNotFound)
    ));
}

#[test]
fn active_survey_requires_a_published_form() {
    let h = harness();
    h.form("Draft only");
    assert!(matches!(
        h.survey.active_survey(),
        Err(FormError::NoActiveForm)
    ));

    let (form, _, _) = h.two_step_form();
    let config = h.survey.active_survey().expect("active");
    assert_eq!(config.survey.id, form.id);
    assert_eq!(config.steps.len(), 2);
}

#[test]
fn slug_resolution_reports_lifecycle() {
    let h = harness();
    assert!(matches!(
        h.survey.resolve_slug("nope"),
        Err(FormError::FormNotFound)
    ));

    let draft = h.form("Draft");
    assert!(matches!(
        h.survey.resolve_slug(&draft.slug),
        Err(FormError::NotPublished)
    ));

    let (live, _, _) = h.two_step_form();
    let tree = h.survey.resolve_slug(&live.slug).expect("published");
    assert_eq!(tree.form.id, live.id);

    h.admin.delete_form(&live.id).expect("archived");
    assert!(matches!(
        h.survey.resolve_slug(&live.slug),
        Err(FormError::Archived)
    ));
}

#[test]
fn preview_hides_children_until_condition_matches() {
    let h = harness();
    let form = h.form("Branching");
    let step = h.step(&form.id, 1);
    let parent = h.question(&step, 1, None);
    let child = h.question(&step, 2, Some((&parent.id, "yes")));

    let hidden = h.admin.preview(&form.id, &[]).expect("preview");
    assert_eq!(hidden[0].visible_question_ids, vec![parent.id.clone()]);

    let shown = h
        .admin
        .preview(&form.id, &[Answer::new(parent.id.clone(), "yes")])
        .expect("preview");
    assert_eq!(
        shown[0].visible_question_ids,
        vec![parent.id.clone(), child.id.clone()]
    );
}
