use std::sync::Arc;
use tracing::{debug, warn};

use crate::case::model::{CreatedIssue, ProjectKey, ValidTestCase};
use crate::config::JiraConfig;
use crate::http::HttpError;
use crate::jira::client::IssueTracker;
use crate::jira::jql::duplicate_query;
use crate::jira::model::{IssueLink, NewTestIssue};

/// Duplicate detection, issue creation and requirement linking on top of an
/// [`IssueTracker`].
#[derive(Clone)]
pub struct TestIssueOperations {
    tracker: Arc<dyn IssueTracker>,
    issue_type: String,
    link_type: String,
    send_priority: bool,
}

impl TestIssueOperations {
    pub fn new(tracker: Arc<dyn IssueTracker>, config: &JiraConfig) -> Self {
        Self {
            tracker,
            issue_type: config.issue_type.clone(),
            link_type: config.link_type.clone(),
            send_priority: config.send_priority,
        }
    }

    /// Key of an existing test with exactly this name that is linked to the
    /// requirement. Near-identical names do not count. Pages through the
    /// search until a match turns up or the results run out.
    pub async fn find_duplicate(
        &self,
        project_key: &ProjectKey,
        requirement_id: &str,
        test_name: &str,
    ) -> Result<Option<String>, HttpError> {
        let jql = duplicate_query(project_key, &self.issue_type, requirement_id, test_name);
        let mut page_token: Option<String> = None;
        loop {
            let page = self.tracker.search(&jql, page_token.as_deref()).await?;
            debug!("{} candidate(s) for {:?}", page.issues.len(), test_name);
            if let Some(issue) = page.issues.iter().find(|issue| issue.fields.summary == test_name) {
                return Ok(Some(issue.key.clone()));
            }
            match page.next_page() {
                Some(next) if page_token.as_deref() != Some(next) => page_token = Some(next.to_string()),
                Some(next) => {
                    warn!("search returned page token {:?} twice, stopping", next);
                    return Ok(None);
                }
                None => return Ok(None),
            }
        }
    }

    pub async fn create(&self, test_case: &ValidTestCase) -> Result<CreatedIssue, HttpError> {
        let issue = NewTestIssue::builder()
            .project_key(test_case.project_key.clone())
            .summary(test_case.name.clone())
            .maybe_description(test_case.objective.clone())
            .issue_type(self.issue_type.clone())
            .maybe_priority(if self.send_priority {
                test_case.priority.clone()
            } else {
                None
            })
            .build();
        self.tracker.create_issue(&issue).await
    }

    pub async fn project_id(&self, project_key: &ProjectKey) -> Result<String, HttpError> {
        self.tracker.project_id(project_key).await
    }

    /// Links the test (outward) to its requirement (inward). Not idempotent.
    pub async fn link_to_requirement(&self, test_key: &str, requirement_id: &str) -> Result<(), HttpError> {
        let link = IssueLink {
            link_type: self.link_type.clone(),
            inward_key: requirement_id.to_string(),
            outward_key: test_key.to_string(),
        };
        self.tracker.link_issues(&link).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jira_config, FakeTracker, TrackerCall};

    fn operations(tracker: Arc<FakeTracker>) -> TestIssueOperations {
        TestIssueOperations::new(tracker, &jira_config())
    }

    #[tokio::test]
    async fn exact_summary_match_is_a_duplicate() {
        let tracker = Arc::new(FakeTracker::default().with_existing("QA-1", "QA-50", "Login test"));
        let ops = operations(tracker.clone());
        let key = ProjectKey::from_requirement("QA-1").unwrap();

        let found = ops.find_duplicate(&key, "QA-1", "Login test").await.unwrap();
        assert_eq!(found.as_deref(), Some("QA-50"));
        assert!(matches!(&tracker.calls()[0], TrackerCall::Search(jql) if jql.contains(r#"linkedIssues("QA-1")"#)));
    }

    #[tokio::test]
    async fn keeps_paging_until_the_exact_match() {
        let mut tracker = FakeTracker::default().with_page_size(2);
        for n in 1..=5 {
            tracker = tracker.with_existing("QA-1", &format!("QA-{}", 50 + n), &format!("Login test {}", n));
        }
        let tracker = Arc::new(tracker.with_existing("QA-1", "QA-99", "Login test"));
        let ops = operations(tracker.clone());
        let key = ProjectKey::from_requirement("QA-1").unwrap();

        let found = ops.find_duplicate(&key, "QA-1", "Login test").await.unwrap();
        assert_eq!(found.as_deref(), Some("QA-99"));
        assert_eq!(tracker.search_pages(), vec![None, Some(2), Some(4)]);
    }

    #[tokio::test]
    async fn stops_paging_once_a_match_is_found() {
        let tracker = Arc::new(
            FakeTracker::default()
                .with_page_size(1)
                .with_existing("QA-1", "QA-50", "Login test")
                .with_existing("QA-1", "QA-51", "Login test 2"),
        );
        let ops = operations(tracker.clone());
        let key = ProjectKey::from_requirement("QA-1").unwrap();

        assert_eq!(ops.find_duplicate(&key, "QA-1", "Login test").await.unwrap().as_deref(), Some("QA-50"));
        assert_eq!(tracker.search_pages(), vec![None]);
    }

    #[tokio::test]
    async fn exhausted_pages_without_match_is_no_duplicate() {
        let tracker = Arc::new(
            FakeTracker::default()
                .with_page_size(1)
                .with_existing("QA-1", "QA-50", "Login test 1")
                .with_existing("QA-1", "QA-51", "Login test 2"),
        );
        let ops = operations(tracker.clone());
        let key = ProjectKey::from_requirement("QA-1").unwrap();

        assert_eq!(ops.find_duplicate(&key, "QA-1", "Login test").await.unwrap(), None);
        assert_eq!(tracker.search_pages(), vec![None, Some(1)]);
    }

    #[tokio::test]
    async fn near_names_are_not_duplicates() {
        let tracker = Arc::new(FakeTracker::default().with_existing("QA-1", "QA-50", "Login Test 2"));
        let ops = operations(tracker);
        let key = ProjectKey::from_requirement("QA-1").unwrap();

        let found = ops.find_duplicate(&key, "QA-1", "Login test").await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn same_name_under_another_requirement_is_not_a_duplicate() {
        let tracker = Arc::new(FakeTracker::default().with_existing("QA-2", "QA-50", "Login test"));
        let ops = operations(tracker);
        let key = ProjectKey::from_requirement("QA-1").unwrap();

        assert_eq!(ops.find_duplicate(&key, "QA-1", "Login test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn link_points_from_requirement_to_test() {
        let tracker = Arc::new(FakeTracker::default());
        let ops = operations(tracker.clone());

        ops.link_to_requirement("QA-9", "QA-1").await.unwrap();
        assert_eq!(
            tracker.calls(),
            vec![TrackerCall::Link(IssueLink {
                link_type: "Relates".to_string(),
                inward_key: "QA-1".to_string(),
                outward_key: "QA-9".to_string(),
            })]
        );
    }

    #[tokio::test]
    async fn priority_is_only_sent_when_enabled() {
        let test_case = crate::case::model::TestCaseRequest::builder()
            .requirement_id("QA-1")
            .name("Login")
            .priority("High")
            .build()
            .validate()
            .unwrap();

        let tracker = Arc::new(FakeTracker::default());
        operations(tracker.clone()).create(&test_case).await.unwrap();
        assert!(matches!(&tracker.calls()[0], TrackerCall::Create(issue) if issue.priority.is_none()));

        let tracker = Arc::new(FakeTracker::default());
        let mut config = jira_config();
        config.send_priority = true;
        TestIssueOperations::new(tracker.clone(), &config)
            .create(&test_case)
            .await
            .unwrap();
        assert!(matches!(&tracker.calls()[0], TrackerCall::Create(issue) if issue.priority.as_deref() == Some("High")));
    }
}
