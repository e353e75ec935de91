use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::domain::{FormId, FormResponse, FormTree, Question, QuestionId};
use super::error::FormError;
use super::repository::ResponseRepository;
use super::service::FormAdminService;
use crate::sync::VALUE_DELIMITER;

const EXPORT_DELIMITER: &str = "; ";

/// Inclusive bounds on `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Range from optional query values; applies only when both ends are given.
    /// Accepts RFC 3339 timestamps or plain dates, a plain end date covering
    /// the whole day.
    pub fn from_query(start: Option<&str>, end: Option<&str>) -> Result<Option<Self>, FormError> {
        let (Some(start), Some(end)) = (start, end) else {
            return Ok(None);
        };
        Ok(Some(Self {
            start: parse_bound(start, false)?,
            end: parse_bound(end, true)?,
        }))
    }

    fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

fn parse_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>, FormError> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| FormError::validation(format!("invalid date '{value}'")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    time.map(|time| date.and_time(time).and_utc())
        .ok_or_else(|| FormError::validation(format!("invalid date '{value}'")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormAnalytics {
    pub overview: Overview,
    pub responses: ResponseSeries,
    pub questions: Vec<QuestionStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub starts: usize,
    pub completions: usize,
    pub completion_rate: f64,
    pub drop_off_rate: Vec<StepDropOff>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDropOff {
    pub step: u32,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodCount {
    pub period: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseSeries {
    pub daily: Vec<PeriodCount>,
    pub weekly: Vec<PeriodCount>,
    pub monthly: Vec<PeriodCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStats {
    pub question_id: QuestionId,
    pub question_text: String,
    pub response_distribution: BTreeMap<String, usize>,
    pub skip_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

/// Rendered export ready to be served as a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub content_type: &'static str,
    pub filename: String,
    pub body: String,
}

#[derive(Clone)]
pub struct AnalyticsService {
    forms: FormAdminService,
    responses: Arc<dyn ResponseRepository>,
}

impl AnalyticsService {
    pub fn new(forms: FormAdminService, responses: Arc<dyn ResponseRepository>) -> Self {
        Self { forms, responses }
    }

    pub fn analytics(
        &self,
        form_id: &FormId,
        range: Option<DateRange>,
    ) -> Result<FormAnalytics, FormError> {
        let tree = self.forms.get_form(form_id)?;
        let responses: Vec<FormResponse> = self
            .responses
            .responses_for_form(form_id)?
            .into_iter()
            .filter(|response| range.map_or(true, |range| range.contains(response.created_at)))
            .collect();
        Ok(summarize(&tree, &responses))
    }

    pub fn export(&self, form_id: &FormId, format: ExportFormat) -> Result<ExportFile, FormError> {
        let tree = self.forms.get_form(form_id)?;
        let mut completed: Vec<FormResponse> = self
            .responses
            .responses_for_form(form_id)?
            .into_iter()
            .filter(|response| response.is_completed)
            .collect();
        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        let questions: Vec<&Question> = tree.questions().collect();

        let file = match format {
            ExportFormat::Csv => ExportFile {
                content_type: "text/csv",
                filename: format!("form-{form_id}-responses.csv"),
                body: export_csv(&questions, &completed)?,
            },
            ExportFormat::Json => ExportFile {
                content_type: "application/json",
                filename: format!("form-{form_id}-responses.json"),
                body: export_json(&questions, &completed)?,
            },
        };
        tracing::info!(form_id = %form_id, rows = completed.len(), "responses exported");
        Ok(file)
    }
}

pub fn summarize(tree: &FormTree, responses: &[FormResponse]) -> FormAnalytics {
    let starts = responses.len();
    let completions = responses.iter().filter(|r| r.is_completed).count();

    let orders: Vec<u32> = tree.steps.iter().map(|entry| entry.step.order).collect();
    let drop_off_rate = orders
        .iter()
        .enumerate()
        .map(|(index, &order)| {
            let reached = responses.iter().filter(|r| r.current_step >= order).count();
            let continued = match orders.get(index + 1) {
                Some(&next) => responses.iter().filter(|r| r.current_step >= next).count(),
                None => completions,
            };
            StepDropOff {
                step: order,
                rate: percentage(reached.saturating_sub(continued), reached),
            }
        })
        .collect();

    let completed: Vec<&FormResponse> = responses.iter().filter(|r| r.is_completed).collect();
    let questions = tree
        .questions()
        .map(|question| {
            let mut response_distribution = BTreeMap::new();
            let mut answered = 0;
            for value in completed.iter().filter_map(|r| r.answer(&question.id)) {
                answered += 1;
                *response_distribution
                    .entry(value.flatten(VALUE_DELIMITER))
                    .or_insert(0) += 1;
            }
            QuestionStats {
                question_id: question.id.clone(),
                question_text: question.text.clone(),
                response_distribution,
                skip_rate: percentage(completed.len() - answered, completed.len()),
            }
        })
        .collect();

    FormAnalytics {
        overview: Overview {
            starts,
            completions,
            completion_rate: percentage(completions, starts),
            drop_off_rate,
        },
        responses: ResponseSeries {
            daily: count_by(responses, |at| at.format("%Y-%m-%d").to_string()),
            weekly: count_by(responses, |at| {
                let offset = i64::from(at.weekday().num_days_from_sunday());
                let week_start = at.date_naive() - Duration::days(offset);
                format!("Week of {}", week_start.format("%Y-%m-%d"))
            }),
            monthly: count_by(responses, |at| at.format("%Y-%m").to_string()),
        },
        questions,
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn count_by<F>(responses: &[FormResponse], key: F) -> Vec<PeriodCount>
where
    F: Fn(DateTime<Utc>) -> String,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for response in responses {
        *counts.entry(key(response.created_at)).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(period, count)| PeriodCount { period, count })
        .collect()
}

fn completed_at(response: &FormResponse) -> Option<String> {
    response
        .completed_at
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn export_csv(questions: &[&Question], responses: &[FormResponse]) -> Result<String, FormError> {
    let export_error = |err: csv::Error| FormError::Export(err.to_string());
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    let header = ["Email", "Completed At"]
        .into_iter()
        .map(str::to_string)
        .chain(questions.iter().map(|question| question.text.clone()));
    writer.write_record(header).map_err(export_error)?;

    for response in responses {
        let row = [response.email.clone(), completed_at(response).unwrap_or_default()]
            .into_iter()
            .chain(questions.iter().map(|question| {
                response
                    .answer(&question.id)
                    .map(|value| value.flatten(EXPORT_DELIMITER))
                    .unwrap_or_default()
            }));
        writer.write_record(row).map_err(export_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| FormError::Export(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| FormError::Export(err.to_string()))
}

fn export_json(questions: &[&Question], responses: &[FormResponse]) -> Result<String, FormError> {
    let rows: Vec<Value> = responses
        .iter()
        .map(|response| {
            let mut row = Map::new();
            row.insert("email".to_string(), Value::String(response.email.clone()));
            row.insert(
                "completedAt".to_string(),
                completed_at(response).map_or(Value::Null, Value::String),
            );
            for question in questions {
                let value = response
                    .answer(&question.id)
                    .and_then(|value| serde_json::to_value(value).ok())
                    .unwrap_or(Value::Null);
                row.insert(question.text.clone(), value);
            }
            Value::Object(row)
        })
        .collect();
    serde_json::to_string_pretty(&rows).map_err(|err| FormError::Export(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::domain::{
        Answer, Branding, Form, QuestionType, ResponseId, Step, StepId, StepWithQuestions,
    };
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).single().expect("valid date")
    }

    fn question(id: &str, step: &str, text: &str) -> Question {
        Question {
            id: QuestionId::from(id),
            step_id: StepId::from(step),
            order: 0,
            text: text.to_string(),
            question_type: QuestionType::Checkbox,
            options: None,
            is_required: false,
            crm_property: String::new(),
            parent_question_id: None,
            condition_value: None,
            nesting_level: 0,
            category: None,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    fn step(id: &str, order: u32, questions: Vec<Question>) -> StepWithQuestions {
        StepWithQuestions {
            step: Step {
                id: StepId::from(id),
                form_id: FormId::from("form-1"),
                order,
                name: format!("Step {order}"),
                description: None,
                created_at: at(1),
                updated_at: at(1),
            },
            questions,
        }
    }

    fn tree() -> FormTree {
        FormTree {
            form: Form {
                id: FormId::from("form-1"),
                name: "Feedback".to_string(),
                slug: "feedback".to_string(),
                form_type: "post_purchase".to_string(),
                description: None,
                is_active: true,
                is_published: true,
                published_at: None,
                branding: Branding::default(),
                settings: Value::Null,
                metadata: Value::Null,
                crm_account: "minimal".to_string(),
                crm_target_type: None,
                crm_target_id_param: None,
                created_at: at(1),
                updated_at: at(1),
            },
            steps: vec![
                step("s1", 1, vec![question("q1", "s1", "Colors")]),
                step("s2", 2, vec![question("q2", "s2", "Comment, \"quoted\"")]),
            ],
            response_count: 0,
        }
    }

    fn response(email: &str, step: u32, completed: Option<u32>, answers: Vec<Answer>) -> FormResponse {
        FormResponse {
            id: ResponseId::generate(),
            email: email.to_string(),
            form_id: FormId::from("form-1"),
            responses: answers,
            current_step: step,
            is_completed: completed.is_some(),
            completed_at: completed.map(at),
            created_at: at(completed.unwrap_or(3)),
            updated_at: at(3),
        }
    }

    fn colors(values: &[&str]) -> Answer {
        Answer::new(
            "q1",
            values.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
        )
    }

    #[test]
    fn overview_tracks_completion_and_drop_off() {
        let responses = vec![
            response("a@example.com", 2, Some(4), vec![colors(&["Red", "Blue"])]),
            response("b@example.com", 1, None, vec![colors(&["Red"])]),
            response("c@example.com", 2, Some(10), vec![]),
            response("d@example.com", 2, Some(11), vec![colors(&["Red", "Blue"])]),
        ];

        let analytics = summarize(&tree(), &responses);
        assert_eq!(analytics.overview.starts, 4);
        assert_eq!(analytics.overview.completions, 3);
        assert!((analytics.overview.completion_rate - 75.0).abs() < f64::EPSILON);
        assert_eq!(analytics.overview.drop_off_rate[0].step, 1);
        assert!((analytics.overview.drop_off_rate[0].rate - 25.0).abs() < f64::EPSILON);
        assert!(analytics.overview.drop_off_rate[1].rate.abs() < f64::EPSILON);

        let colors = &analytics.questions[0];
        assert_eq!(colors.response_distribution.get("Red, Blue"), Some(&2));
        assert!((colors.skip_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn date_range_needs_both_bounds_and_covers_end_day() {
        assert_eq!(DateRange::from_query(Some("2024-03-01"), None).expect("ok"), None);

        let range = DateRange::from_query(Some("2024-03-01"), Some("2024-03-04"))
            .expect("ok")
            .expect("range");
        assert!(range.contains(at(4)));
        assert!(!range.contains(at(5)));

        let range = DateRange::from_query(
            Some("2024-03-01T00:00:00Z"),
            Some("2024-03-04T11:00:00+00:00"),
        )
        .expect("ok")
        .expect("range");
        assert!(!range.contains(at(4)));

        assert!(DateRange::from_query(Some("yesterday"), Some("2024-03-04")).is_err());
    }

    #[test]
    fn weekly_buckets_start_on_sunday() {
        // 2024-03-04 is a Monday, 2024-03-10 a Sunday.
        let responses = vec![
            response("a@example.com", 1, Some(4), vec![]),
            response("b@example.com", 1, Some(9), vec![]),
            response("c@example.com", 1, Some(10), vec![]),
        ];

        let series = summarize(&tree(), &responses).responses;
        assert_eq!(
            series.weekly,
            vec![
                PeriodCount {
                    period: "Week of 2024-03-03".to_string(),
                    count: 2
                },
                PeriodCount {
                    period: "Week of 2024-03-10".to_string(),
                    count: 1
                },
            ]
        );
        assert_eq!(series.monthly[0].period, "2024-03");
        assert_eq!(series.daily.len(), 3);
    }

    #[test]
    fn csv_export_quotes_every_cell_and_joins_arrays() {
        let tree = tree();
        let questions: Vec<&Question> = tree.questions().collect();
        let responses = vec![response(
            "a@example.com",
            2,
            Some(4),
            vec![colors(&["Red", "Blue"])],
        )];

        let csv = export_csv(&questions, &responses).expect("csv renders");
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some(r#""Email","Completed At","Colors","Comment, ""quoted""""#)
        );
        assert_eq!(
            lines.next(),
            Some(r#""a@example.com","2024-03-04T12:00:00.000Z","Red; Blue","""#)
        );
    }

    #[test]
    fn json_export_keys_answers_by_question_text() {
        let tree = tree();
        let questions: Vec<&Question> = tree.questions().collect();
        let responses = vec![response("a@example.com", 2, Some(4), vec![colors(&["Red"])])];

        let json = export_json(&questions, &responses).expect("json renders");
        let rows: Vec<Value> = serde_json::from_str(&json).expect("valid json");
        assert_eq!(rows[0]["Colors"], serde_json::json!(["Red"]));
        assert_eq!(rows[0]["Comment, \"quoted\""], Value::Null);
        assert_eq!(rows[0]["email"], "a@example.com");
    }
}
