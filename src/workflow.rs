//! Workflow document model (v0.1)
//!
//! Record descriptors for every part of a GitHub Actions workflow file.
//! Field order is output order.

use crate::field;
use crate::schema::{Lit, Record, Ty, BASE};

/// Runner used for jobs with steps and no `runs-on`.
pub const DEFAULT_RUNNER: &str = "ubuntu-latest";

/// Input types accepted by `workflow_dispatch` and `workflow_call`.
pub const INPUT_TYPES: &[&str] = &["boolean", "choice", "number", "environment", "string"];

const PERMISSION: &[&str] = &["read", "write", "none"];

// ============================================================================
// TRIGGERS
// ============================================================================

macro_rules! strict_trigger {
    ($record:ident, $ty:ident, $name:literal, $kinds:expr) => {
        pub static $record: Record = Record {
            name: $name,
            fields: &[field!("types", Ty::List(&Ty::Choice($kinds)))],
            ty: &$ty,
            ..BASE
        };
        pub static $ty: Ty = Ty::Record(&$record);
    };
}

const CRUD: &[&str] = &["created", "edited", "deleted"];

const PULL_REQUEST_KINDS: &[&str] = &[
    "assigned",
    "unassigned",
    "labeled",
    "unlabeled",
    "opened",
    "edited",
    "closed",
    "reopened",
    "synchronize",
    "converted_to_draft",
    "locked",
    "unlocked",
    "enqueued",
    "dequeued",
    "milestoned",
    "demilestoned",
    "ready_for_review",
    "review_requested",
    "review_request_removed",
    "auto_merge_enabled",
    "auto_merge_disabled",
];

strict_trigger!(BRANCH_PROTECTION_RULE, BRANCH_PROTECTION_RULE_TY, "BranchProtectionRule", CRUD);
strict_trigger!(
    CHECK_RUN,
    CHECK_RUN_TY,
    "CheckRun",
    &["created", "rerequested", "completed", "requested_action"]
);
strict_trigger!(CHECK_SUITE, CHECK_SUITE_TY, "CheckSuite", &["completed"]);
strict_trigger!(
    DISCUSSION,
    DISCUSSION_TY,
    "Discussion",
    &[
        "created",
        "edited",
        "deleted",
        "transferred",
        "pinned",
        "unpinned",
        "labeled",
        "unlabeled",
        "locked",
        "unlocked",
        "category_changed",
        "answered",
        "unanswered",
    ]
);
strict_trigger!(DISCUSSION_COMMENT, DISCUSSION_COMMENT_TY, "DiscussionComment", CRUD);
strict_trigger!(ISSUE_COMMENT, ISSUE_COMMENT_TY, "IssueComment", CRUD);
strict_trigger!(
    ISSUES,
    ISSUES_TY,
    "Issues",
    &[
        "opened",
        "edited",
        "deleted",
        "transferred",
        "pinned",
        "unpinned",
        "closed",
        "reopened",
        "assigned",
        "unassigned",
        "labeled",
        "unlabeled",
        "locked",
        "unlocked",
        "milestoned",
        "demilestoned",
    ]
);
strict_trigger!(LABEL, LABEL_TY, "Label", CRUD);
strict_trigger!(MERGE_GROUP, MERGE_GROUP_TY, "MergeGroup", &["checks_requested"]);
strict_trigger!(
    MILESTONE,
    MILESTONE_TY,
    "Milestone",
    &["created", "closed", "opened", "edited", "deleted"]
);
strict_trigger!(
    PULL_REQUEST_REVIEW,
    PULL_REQUEST_REVIEW_TY,
    "PullRequestReview",
    &["submitted", "edited", "dismissed"]
);
strict_trigger!(
    PULL_REQUEST_REVIEW_COMMENT,
    PULL_REQUEST_REVIEW_COMMENT_TY,
    "PullRequestReviewComment",
    CRUD
);
strict_trigger!(REGISTRY_PACKAGE, REGISTRY_PACKAGE_TY, "RegistryPackage", &["published", "updated"]);
strict_trigger!(
    RELEASE,
    RELEASE_TY,
    "Release",
    &["published", "unpublished", "created", "edited", "deleted", "prereleased", "released"]
);
strict_trigger!(WATCH, WATCH_TY, "Watch", &["started"]);
strict_trigger!(
    WORKFLOW_RUN,
    WORKFLOW_RUN_TY,
    "WorkflowRun",
    &["completed", "in_progress", "requested"]
);

/// Trigger without options
pub static TRIGGER: Record = Record {
    name: "Trigger",
    ty: &TRIGGER_TY,
    ..BASE
};
pub static TRIGGER_TY: Ty = Ty::Record(&TRIGGER);

/// Trigger with free-form `types`
pub static TYPED_TRIGGER: Record = Record {
    name: "TypedTrigger",
    fields: &[field!("types", Ty::List(&Ty::Str))],
    ty: &TYPED_TRIGGER_TY,
    ..BASE
};
pub static TYPED_TRIGGER_TY: Ty = Ty::Record(&TYPED_TRIGGER);

pub static PULL_REQUEST: Record = Record {
    name: "PullRequest",
    fields: &[
        field!("types", Ty::List(&Ty::Choice(PULL_REQUEST_KINDS))),
        field!("branches", Ty::List(&Ty::Str)),
        field!("branches_ignore", Ty::List(&Ty::Str)),
        field!("paths", Ty::List(&Ty::Str)),
        field!("paths_ignore", Ty::List(&Ty::Str)),
    ],
    ty: &PULL_REQUEST_TY,
    ..BASE
};
pub static PULL_REQUEST_TY: Ty = Ty::Record(&PULL_REQUEST);

pub static PUSH: Record = Record {
    name: "Push",
    fields: &[
        field!("branches", Ty::List(&Ty::Str)),
        field!("branches_ignore", Ty::List(&Ty::Str)),
        field!("paths", Ty::List(&Ty::Str)),
        field!("paths_ignore", Ty::List(&Ty::Str)),
        field!("tags", Ty::List(&Ty::Str)),
        field!("tags_ignore", Ty::List(&Ty::Str)),
    ],
    ty: &PUSH_TY,
    ..BASE
};
pub static PUSH_TY: Ty = Ty::Record(&PUSH);

pub static SCHEDULE: Record = Record {
    name: "Schedule",
    fields: &[field!("cron", Ty::Str)],
    ty: &SCHEDULE_TY,
    ..BASE
};
pub static SCHEDULE_TY: Ty = Ty::Record(&SCHEDULE);

pub static INPUT: Record = Record {
    name: "Input",
    fields: &[
        field!("description", Ty::Str),
        field!("id", Ty::Str),
        field!("required", Ty::Bool, Lit::Bool(false)),
        field!(
            "default",
            Ty::Union(&[Ty::Str, Ty::Bool, Ty::Number, Ty::Map(&Ty::Str)])
        ),
        field!("type_", Ty::Choice(INPUT_TYPES), Lit::Str("string")),
        field!("options", Ty::List(&Ty::Str)),
    ],
    ty: &INPUT_TY,
    ..BASE
};
pub static INPUT_TY: Ty = Ty::Record(&INPUT);

pub static SECRET: Record = Record {
    name: "Secret",
    fields: &[
        field!("description", Ty::Str),
        field!("id", Ty::Str),
        field!("required", Ty::Bool, Lit::Bool(false)),
    ],
    ty: &SECRET_TY,
    ..BASE
};
pub static SECRET_TY: Ty = Ty::Record(&SECRET);

pub static OUTPUT: Record = Record {
    name: "Output",
    fields: &[
        field!("description", Ty::Str),
        field!("id", Ty::Str),
        field!("value", Ty::Value),
    ],
    ty: &OUTPUT_TY,
    ..BASE
};
pub static OUTPUT_TY: Ty = Ty::Record(&OUTPUT);

pub static WORKFLOW_DISPATCH: Record = Record {
    name: "WorkflowDispatch",
    fields: &[field!("inputs", Ty::IdList(&INPUT))],
    ty: &WORKFLOW_DISPATCH_TY,
    ..BASE
};
pub static WORKFLOW_DISPATCH_TY: Ty = Ty::Record(&WORKFLOW_DISPATCH);

pub static WORKFLOW_CALL: Record = Record {
    name: "WorkflowCall",
    fields: &[
        field!("inputs", Ty::IdList(&INPUT)),
        field!("outputs", Ty::IdList(&OUTPUT)),
        field!("secrets", Ty::IdList(&SECRET)),
    ],
    ty: &WORKFLOW_CALL_TY,
    ..BASE
};
pub static WORKFLOW_CALL_TY: Ty = Ty::Record(&WORKFLOW_CALL);

pub static ON: Record = Record {
    name: "On",
    fields: &[
        field!("branch_protection_rule", Ty::Record(&BRANCH_PROTECTION_RULE)),
        field!("check_run", Ty::Record(&CHECK_RUN)),
        field!("check_suite", Ty::Record(&CHECK_SUITE)),
        field!("create", Ty::Record(&TRIGGER)),
        field!("delete", Ty::Record(&TRIGGER)),
        field!("deployment", Ty::Record(&TRIGGER)),
        field!("deployment_status", Ty::Record(&TRIGGER)),
        field!("discussion", Ty::Record(&DISCUSSION)),
        field!("discussion_comment", Ty::Record(&DISCUSSION_COMMENT)),
        field!("fork", Ty::Record(&TRIGGER)),
        field!("gollum", Ty::Record(&TRIGGER)),
        field!("issue_comment", Ty::Record(&ISSUE_COMMENT)),
        field!("issues", Ty::Record(&ISSUES)),
        field!("label", Ty::Record(&LABEL)),
        field!("merge_group", Ty::Record(&MERGE_GROUP)),
        field!("milestone", Ty::Record(&MILESTONE)),
        field!("page_build", Ty::Record(&TRIGGER)),
        field!("public", Ty::Record(&TRIGGER)),
        field!("pull_request", Ty::Record(&PULL_REQUEST)),
        field!("pull_request_review", Ty::Record(&PULL_REQUEST_REVIEW)),
        field!(
            "pull_request_review_comment",
            Ty::Record(&PULL_REQUEST_REVIEW_COMMENT)
        ),
        field!("pull_request_target", Ty::Record(&PULL_REQUEST)),
        field!("push", Ty::Record(&PUSH)),
        field!("registry_package", Ty::Record(&REGISTRY_PACKAGE)),
        field!("release", Ty::Record(&RELEASE)),
        field!("repository_dispatch", Ty::Record(&TYPED_TRIGGER)),
        field!("schedule", Ty::List(&SCHEDULE_TY)),
        field!("status", Ty::Record(&TRIGGER)),
        field!("watch", Ty::Record(&WATCH)),
        field!("workflow_call", Ty::Record(&WORKFLOW_CALL)),
        field!("workflow_dispatch", Ty::Record(&WORKFLOW_DISPATCH)),
        field!("workflow_run", Ty::Record(&WORKFLOW_RUN)),
    ],
    preserve_underscores: true,
    ty: &ON_TY,
    ..BASE
};
pub static ON_TY: Ty = Ty::Record(&ON);

// ============================================================================
// JOBS AND STEPS
// ============================================================================

pub static STEP: Record = Record {
    name: "Step",
    fields: &[
        field!("id", Ty::Str),
        field!("name", Ty::Value),
        field!("if_", Ty::Value),
        field!("continue_on_error", Ty::Value),
        field!("run", Ty::Value),
        field!("env", Ty::Map(&Ty::Value)),
        field!("uses", Ty::Str),
        field!("with_", Ty::Map(&Ty::Value)),
        field!("outputs", Ty::List(&Ty::Str)),
        field!("needs", Ty::List(&Ty::Str)),
    ],
    internal: &["outputs", "needs"],
    conditions: &["if_"],
    ty: &STEP_TY,
    ..BASE
};
pub static STEP_TY: Ty = Ty::Record(&STEP);

pub static MATRIX: Record = Record {
    name: "Matrix",
    fields: &[
        field!("include", Ty::List(&Ty::Map(&Ty::Value))),
        field!("exclude", Ty::List(&Ty::Map(&Ty::Value))),
        field!("values", Ty::Map(&Ty::List(&Ty::Value))),
    ],
    flow: &["include", "exclude", "values"],
    flatten: Some("values"),
    ty: &MATRIX_TY,
    ..BASE
};
pub static MATRIX_TY: Ty = Ty::Record(&MATRIX);

static MATRIX_OR_EXPR: [Ty; 2] = [Ty::Record(&MATRIX), Ty::Expr];

pub static STRATEGY: Record = Record {
    name: "Strategy",
    fields: &[
        field!("matrix", Ty::Union(&MATRIX_OR_EXPR)),
        field!("fail_fast", Ty::Value),
        field!("max_parallel", Ty::Value),
    ],
    ty: &STRATEGY_TY,
    ..BASE
};
pub static STRATEGY_TY: Ty = Ty::Record(&STRATEGY);

pub static CREDENTIALS: Record = Record {
    name: "Credentials",
    fields: &[field!("username", Ty::Value), field!("password", Ty::Value)],
    ty: &CREDENTIALS_TY,
    ..BASE
};
pub static CREDENTIALS_TY: Ty = Ty::Record(&CREDENTIALS);

pub static CONTAINER: Record = Record {
    name: "Container",
    fields: &[
        field!("image", Ty::Value),
        field!("credentials", Ty::Record(&CREDENTIALS)),
        field!("env", Ty::Map(&Ty::Value)),
        field!("ports", Ty::List(&Ty::Value)),
        field!("volumes", Ty::List(&Ty::Value)),
        field!("options", Ty::Value),
    ],
    ty: &CONTAINER_TY,
    ..BASE
};
pub static CONTAINER_TY: Ty = Ty::Record(&CONTAINER);

pub static SERVICE: Record = Record {
    name: "Service",
    fields: &[
        field!("id", Ty::Str),
        field!("image", Ty::Value),
        field!("credentials", Ty::Record(&CREDENTIALS)),
        field!("env", Ty::Map(&Ty::Value)),
        field!("ports", Ty::List(&Ty::Value)),
        field!("volumes", Ty::List(&Ty::Value)),
        field!("options", Ty::Value),
    ],
    ty: &SERVICE_TY,
    ..BASE
};
pub static SERVICE_TY: Ty = Ty::Record(&SERVICE);

pub static PERMISSIONS: Record = Record {
    name: "Permissions",
    fields: &[
        field!("actions", Ty::Choice(PERMISSION)),
        field!("attestations", Ty::Choice(PERMISSION)),
        field!("checks", Ty::Choice(PERMISSION)),
        field!("contents", Ty::Choice(PERMISSION)),
        field!("deployments", Ty::Choice(PERMISSION)),
        field!("id_token", Ty::Choice(&["write", "none"])),
        field!("issues", Ty::Choice(PERMISSION)),
        field!("discussions", Ty::Choice(PERMISSION)),
        field!("packages", Ty::Choice(PERMISSION)),
        field!("pages", Ty::Choice(PERMISSION)),
        field!("pull_requests", Ty::Choice(PERMISSION)),
        field!("repository_projects", Ty::Choice(PERMISSION)),
        field!("security_events", Ty::Choice(PERMISSION)),
        field!("statuses", Ty::Choice(PERMISSION)),
    ],
    ty: &PERMISSIONS_TY,
    ..BASE
};
pub static PERMISSIONS_TY: Ty = Ty::Record(&PERMISSIONS);

/// Blanket permission levels
pub const ALL_PERMISSIONS: &[&str] = &["read-all", "write-all"];

static PERMISSIONS_OR_ALL: [Ty; 2] = [Ty::Record(&PERMISSIONS), Ty::Choice(ALL_PERMISSIONS)];

pub static CONCURRENCY: Record = Record {
    name: "Concurrency",
    fields: &[
        field!("group", Ty::Value),
        field!("cancel_in_progress", Ty::Value),
    ],
    ty: &CONCURRENCY_TY,
    ..BASE
};
pub static CONCURRENCY_TY: Ty = Ty::Record(&CONCURRENCY);

pub static ENVIRONMENT: Record = Record {
    name: "Environment",
    fields: &[field!("name", Ty::Value), field!("url", Ty::Value)],
    ty: &ENVIRONMENT_TY,
    ..BASE
};
pub static ENVIRONMENT_TY: Ty = Ty::Record(&ENVIRONMENT);

static ENVIRONMENT_OR_VALUE: [Ty; 2] = [Ty::Record(&ENVIRONMENT), Ty::Value];

pub static JOB_RUN_DEFAULTS: Record = Record {
    name: "RunDefaults",
    fields: &[
        field!("shell", Ty::Value),
        field!("working_directory", Ty::Value),
    ],
    ty: &JOB_RUN_DEFAULTS_TY,
    ..BASE
};
pub static JOB_RUN_DEFAULTS_TY: Ty = Ty::Record(&JOB_RUN_DEFAULTS);

pub static JOB_DEFAULTS: Record = Record {
    name: "JobDefaults",
    fields: &[field!("run", Ty::Record(&JOB_RUN_DEFAULTS))],
    ty: &JOB_DEFAULTS_TY,
    ..BASE
};
pub static JOB_DEFAULTS_TY: Ty = Ty::Record(&JOB_DEFAULTS);

pub static WORKFLOW_RUN_DEFAULTS: Record = Record {
    name: "RunDefaults",
    fields: &[
        field!("shell", Ty::Str),
        field!("working_directory", Ty::Str),
    ],
    ty: &WORKFLOW_RUN_DEFAULTS_TY,
    ..BASE
};
pub static WORKFLOW_RUN_DEFAULTS_TY: Ty = Ty::Record(&WORKFLOW_RUN_DEFAULTS);

pub static WORKFLOW_DEFAULTS: Record = Record {
    name: "WorkflowDefaults",
    fields: &[field!("run", Ty::Record(&WORKFLOW_RUN_DEFAULTS))],
    ty: &WORKFLOW_DEFAULTS_TY,
    ..BASE
};
pub static WORKFLOW_DEFAULTS_TY: Ty = Ty::Record(&WORKFLOW_DEFAULTS);

static SECRETS_OR_INHERIT: [Ty; 2] = [Ty::Map(&Ty::Value), Ty::Choice(&["inherit"])];

pub static JOB: Record = Record {
    name: "Job",
    fields: &[
        field!("name", Ty::Value),
        field!("permissions", Ty::Union(&PERMISSIONS_OR_ALL)),
        field!("needs", Ty::List(&Ty::Str)),
        field!("if_", Ty::Value),
        field!("runs_on", Ty::Value),
        field!("timeout_minutes", Ty::Value),
        field!("concurrency", Ty::Record(&CONCURRENCY)),
        field!("environment", Ty::Union(&ENVIRONMENT_OR_VALUE)),
        field!("container", Ty::Record(&CONTAINER)),
        field!("services", Ty::IdList(&SERVICE)),
        field!("outputs", Ty::Map(&Ty::Value)),
        field!("strategy", Ty::Record(&STRATEGY)),
        field!("env", Ty::Map(&Ty::Value)),
        field!("defaults", Ty::Record(&JOB_DEFAULTS)),
        field!("steps", Ty::List(&STEP_TY)),
        field!("uses", Ty::Str),
        field!("with_", Ty::Map(&Ty::Value)),
        field!("secrets", Ty::Union(&SECRETS_OR_INHERIT)),
    ],
    flow: &["needs"],
    conditions: &["if_"],
    ty: &JOB_TY,
    ..BASE
};
pub static JOB_TY: Ty = Ty::Record(&JOB);

pub static WORKFLOW: Record = Record {
    name: "Workflow",
    fields: &[
        field!("name", Ty::Value),
        field!("on", Ty::Record(&ON)),
        field!("permissions", Ty::Union(&PERMISSIONS_OR_ALL)),
        field!("concurrency", Ty::Record(&CONCURRENCY)),
        field!("env", Ty::Map(&Ty::Value)),
        field!("defaults", Ty::Record(&WORKFLOW_DEFAULTS)),
        field!("jobs", Ty::Map(&JOB_TY)),
    ],
    ty: &WORKFLOW_TY,
    ..BASE
};
pub static WORKFLOW_TY: Ty = Ty::Record(&WORKFLOW);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_field_order() {
        let names: Vec<&str> = WORKFLOW.fields.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec!["name", "on", "permissions", "concurrency", "env", "defaults", "jobs"]
        );
    }

    #[test]
    fn test_on_keeps_underscores() {
        assert_eq!(ON.key("pull_request"), "pull_request");
        assert_eq!(JOB.key("runs_on"), "runs-on");
        assert_eq!(PUSH.key("tags_ignore"), "tags-ignore");
    }

    #[test]
    fn test_union_instantiates_first_branch() {
        let (_, matrix) = STRATEGY.field("matrix").unwrap();
        assert_eq!(matrix.ty.record().map(|r| r.name), Some("Matrix"));
        let (_, permissions) = JOB.field("permissions").unwrap();
        assert_eq!(permissions.ty.record().map(|r| r.name), Some("Permissions"));
    }

    #[test]
    fn test_id_list_element() {
        let (_, inputs) = WORKFLOW_DISPATCH.field("inputs").unwrap();
        assert_eq!(inputs.ty.element().and_then(Ty::record).map(|r| r.name), Some("Input"));
    }

    #[test]
    fn test_pull_request_kinds() {
        assert_eq!(PULL_REQUEST_KINDS.len(), 21);
    }
}
