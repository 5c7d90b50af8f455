//! Built-in rule library.
//!
//! A curated set covering the common effect providers: databases,
//! payments, auth, HTTP, messaging, storage, and observability.
//! Patterns match the raw callee identifier path. Broad fallbacks
//! (console logging, bare fetch) sit at negative priority so specific
//! providers win.

use serde_json::json;

use crate::rules::Rule;

/// The full built-in rule set, in definition order.
pub fn builtin_rules() -> Vec<Rule> {
    let mut rules = Vec::new();

    // ---- Database ----
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "db.dynamodb.write",
            "DynamoDB write",
            r"(?i)(dynamodb|docclient|ddb)\.(put|putItem|update|updateItem|delete|deleteItem|batchWrite\w*|transactWrite\w*)$",
            "Database",
            "Write",
        ),
        json!({"provider": "dynamodb"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "db.dynamodb.read",
            "DynamoDB read",
            r"(?i)(dynamodb|docclient|ddb)\.(get|getItem|query|scan|batchGet\w*)$",
            "Database",
            "Read",
        ),
        json!({"provider": "dynamodb"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "db.sql.read",
            "SQL query",
            r"(db|knex|sql|trx|client|pool)\.(select|from|where|query|raw)$",
            "Database",
            "Read",
        ),
        json!({"provider": "sql"}),
        5,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "db.sql.write",
            "SQL mutation",
            r"(db|knex|sql|trx|client|pool)\.(insert|update|delete|del|truncate)$",
            "Database",
            "Write",
        ),
        json!({"provider": "sql"}),
        5,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "db.prisma.read",
            "Prisma read",
            r"prisma\.\w+\.(findMany|findUnique|findUniqueOrThrow|findFirst|count|aggregate|groupBy)$",
            "Database",
            "Read",
        ),
        json!({"provider": "prisma"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "db.prisma.write",
            "Prisma write",
            r"prisma\.\w+\.(create|createMany|update|updateMany|upsert|delete|deleteMany)$",
            "Database",
            "Write",
        ),
        json!({"provider": "prisma"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "db.kysely.read",
            "Kysely select",
            r"(db|kysely)\.(selectFrom|selectNoFrom|with)$",
            "Database",
            "Read",
        ),
        json!({"provider": "kysely"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "db.kysely.write",
            "Kysely mutation",
            r"(db|kysely)\.(insertInto|updateTable|deleteFrom|replaceInto)$",
            "Database",
            "Write",
        ),
        json!({"provider": "kysely"}),
        10,
    ));

    // ---- Payment ----
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "payment.stripe.charge",
            "Stripe charge",
            r"stripe\.(charges\.create|paymentIntents\.(create|confirm|capture))$",
            "Payment",
            "Charge",
        ),
        json!({"provider": "stripe"}),
        20,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "payment.stripe.refund",
            "Stripe refund",
            r"stripe\.refunds\.create$",
            "Payment",
            "Refund",
        ),
        json!({"provider": "stripe"}),
        20,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "payment.stripe.customer",
            "Stripe customer management",
            r"stripe\.customers\.(create|update|del|retrieve)$",
            "Payment",
            "CustomerManage",
        ),
        json!({"provider": "stripe"}),
        20,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "payment.stripe.subscription",
            "Stripe subscription",
            r"stripe\.subscriptions\.(create|update|cancel|del)$",
            "Payment",
            "Subscription",
        ),
        json!({"provider": "stripe"}),
        20,
    ));

    // ---- Auth ----
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "auth.jwt.issue",
            "JWT issue",
            r"(jwt|jsonwebtoken)\.sign$",
            "Auth",
            "IssueToken",
        ),
        json!({"provider": "jwt"}),
        15,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "auth.jwt.verify",
            "JWT verify",
            r"(jwt|jsonwebtoken)\.(verify|decode)$",
            "Auth",
            "VerifyToken",
        ),
        json!({"provider": "jwt"}),
        15,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "auth.bcrypt.hash",
            "Password hash",
            r"bcrypt\.(hash|hashSync|genSalt\w*)$",
            "Auth",
            "HashPassword",
        ),
        json!({"provider": "bcrypt"}),
        15,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "auth.bcrypt.verify",
            "Password verify",
            r"bcrypt\.(compare|compareSync)$",
            "Auth",
            "VerifyPassword",
        ),
        json!({"provider": "bcrypt"}),
        15,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "auth.cognito",
            "Cognito authentication",
            r"(?i)cognito\w*\.(initiateAuth|adminInitiateAuth|signUp|confirmSignUp|respondToAuthChallenge|getUser|globalSignOut)$",
            "Auth",
            "Authenticate",
        ),
        json!({"provider": "cognito"}),
        15,
    ));

    // ---- HTTP ----
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "http.axios",
            "Axios request",
            r"^axios(\.(get|post|put|patch|delete|head|options|request))?$",
            "Http",
            "Request",
        ),
        json!({"provider": "axios"}),
        5,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee("http.fetch", "Fetch request", r"^fetch$", "Http", "Request"),
        json!({"provider": "fetch"}),
        -5,
    ));

    // ---- Messaging ----
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "messaging.sqs.publish",
            "SQS send",
            r"(?i)sqs\.(sendMessage|sendMessageBatch)$",
            "Messaging",
            "Publish",
        ),
        json!({"provider": "sqs"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "messaging.sqs.consume",
            "SQS receive",
            r"(?i)sqs\.(receiveMessage|deleteMessage|deleteMessageBatch)$",
            "Messaging",
            "Consume",
        ),
        json!({"provider": "sqs"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "messaging.sns.publish",
            "SNS publish",
            r"(?i)sns\.(publish|publishBatch)$",
            "Messaging",
            "Publish",
        ),
        json!({"provider": "sns"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "messaging.eventbridge.publish",
            "EventBridge put",
            r"(?i)(eventbridge|events)\.putEvents$",
            "Messaging",
            "Publish",
        ),
        json!({"provider": "eventbridge"}),
        10,
    ));

    // ---- Storage ----
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "storage.s3.write",
            "S3 write",
            r"(?i)s3\.(putObject|upload|deleteObject\w*|copyObject|createMultipartUpload)$",
            "Storage",
            "Write",
        ),
        json!({"provider": "s3"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "storage.s3.read",
            "S3 read",
            r"(?i)s3\.(getObject|headObject|listObjects\w*)$",
            "Storage",
            "Read",
        ),
        json!({"provider": "s3"}),
        10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "storage.fs.write",
            "Filesystem write",
            r"fs\.(promises\.)?(writeFile\w*|appendFile\w*|unlink\w*|mkdir\w*|rm\w*|rename\w*)$",
            "Storage",
            "Write",
        ),
        json!({"provider": "fs"}),
        5,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "storage.fs.read",
            "Filesystem read",
            r"fs\.(promises\.)?(readFile\w*|readdir\w*|stat\w*|access\w*)$",
            "Storage",
            "Read",
        ),
        json!({"provider": "fs"}),
        5,
    ));

    // ---- Observability ----
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "observability.console",
            "Console logging",
            r"^console\.(log|info|warn|error|debug|trace)$",
            "Observability",
            "Log",
        ),
        json!({"provider": "console"}),
        -10,
    ));
    rules.extend(rule_or_skip(
        Rule::on_callee(
            "observability.datadog",
            "Datadog metric",
            r"(?i)(datadog|dogstatsd|statsd)\.(increment|decrement|gauge|histogram|distribution|event|flush)$",
            "Observability",
            "Metric",
        ),
        json!({"provider": "datadog"}),
        10,
    ));

    rules
}

/// Rules whose emitted domain equals `domain` (case-insensitive).
pub fn rules_for_domain(domain: &str) -> Vec<Rule> {
    builtin_rules()
        .into_iter()
        .filter(|r| r.emit.domain.eq_ignore_ascii_case(domain))
        .collect()
}

/// Rules whose metadata `provider` equals `provider` (case-insensitive).
pub fn rules_for_provider(provider: &str) -> Vec<Rule> {
    builtin_rules()
        .into_iter()
        .filter(|r| {
            r.emit
                .metadata
                .as_ref()
                .and_then(|m| m.get("provider"))
                .and_then(|p| p.as_str())
                .map(|p| p.eq_ignore_ascii_case(provider))
                .unwrap_or(false)
        })
        .collect()
}

/// The hand-written patterns above are static; a failure to compile is
/// a library bug, logged and dropped rather than propagated.
fn rule_or_skip(
    rule: crate::error::DevacResult<Rule>,
    metadata: serde_json::Value,
    priority: i32,
) -> Option<Rule> {
    match rule {
        Ok(rule) => Some(rule.with_metadata(metadata).with_priority(priority)),
        Err(err) => {
            tracing::error!(error = %err, "built-in rule failed to compile, skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleEngine;
    use crate::types::CodeEffect;

    fn call(callee: &str, external: bool) -> CodeEffect {
        CodeEffect {
            effect_id: format!("fx-{callee}"),
            effect_type: "FunctionCall".into(),
            source_entity_id: "r:p:function:00000001".into(),
            file_path: "main.ts".into(),
            start_line: 1,
            callee_name: callee.into(),
            is_external: external,
            is_async: false,
            is_constructor: false,
            branch: "base".into(),
            is_deleted: false,
            updated_at: 0,
            properties: None,
        }
    }

    fn classify(callee: &str) -> Option<(String, String, String)> {
        let engine = RuleEngine::with_builtin_rules(0);
        let report = engine.process(&[call(callee, true)]);
        report.domain_effects.first().map(|de| {
            (
                de.domain.clone(),
                de.action.clone(),
                de.metadata["provider"].as_str().unwrap_or("").to_string(),
            )
        })
    }

    #[test]
    fn test_stripe_charge() {
        let (domain, action, provider) = classify("stripe.charges.create").expect("match");
        assert_eq!(domain, "Payment");
        assert_eq!(action, "Charge");
        assert_eq!(provider, "stripe");
    }

    #[test]
    fn test_dynamodb_put_is_database_write() {
        let (domain, action, provider) = classify("dynamodb.putItem").expect("match");
        assert_eq!(domain, "Database");
        assert_eq!(action, "Write");
        assert_eq!(provider, "dynamodb");
    }

    #[test]
    fn test_sql_select_matches_without_parens() {
        let (domain, action, provider) = classify("db.select").expect("match");
        assert_eq!(domain, "Database");
        assert_eq!(action, "Read");
        assert_eq!(provider, "sql");
    }

    #[test]
    fn test_prisma_and_kysely() {
        assert_eq!(classify("prisma.user.findMany").expect("match").1, "Read");
        assert_eq!(classify("prisma.user.createMany").expect("match").1, "Write");
        assert_eq!(classify("db.selectFrom").expect("match").2, "kysely");
        assert_eq!(classify("db.insertInto").expect("match").1, "Write");
    }

    #[test]
    fn test_auth_rules() {
        assert_eq!(classify("jwt.sign").expect("match").1, "IssueToken");
        assert_eq!(classify("jwt.verify").expect("match").1, "VerifyToken");
        assert_eq!(classify("bcrypt.hash").expect("match").1, "HashPassword");
        assert_eq!(classify("bcrypt.compare").expect("match").1, "VerifyPassword");
        assert_eq!(classify("cognitoClient.initiateAuth").expect("match").2, "cognito");
    }

    #[test]
    fn test_http_messaging_storage() {
        assert_eq!(classify("fetch").expect("match").2, "fetch");
        assert_eq!(classify("axios.post").expect("match").2, "axios");
        assert_eq!(classify("sqs.sendMessage").expect("match").1, "Publish");
        assert_eq!(classify("sns.publish").expect("match").2, "sns");
        assert_eq!(classify("eventBridge.putEvents").expect("match").2, "eventbridge");
        assert_eq!(classify("s3.putObject").expect("match").1, "Write");
        assert_eq!(classify("s3.getObject").expect("match").1, "Read");
        assert_eq!(classify("fs.readFileSync").expect("match").1, "Read");
        assert_eq!(classify("fs.writeFile").expect("match").1, "Write");
    }

    #[test]
    fn test_observability() {
        let (domain, action, provider) = classify("console.log").expect("match");
        assert_eq!((domain.as_str(), action.as_str(), provider.as_str()),
                   ("Observability", "Log", "console"));
        assert_eq!(classify("statsd.increment").expect("match").1, "Metric");
    }

    #[test]
    fn test_unmatched_callee() {
        assert!(classify("myLocalHelper").is_none());
    }

    #[test]
    fn test_library_queryable() {
        assert!(!rules_for_domain("Database").is_empty());
        assert!(rules_for_domain("database").len() >= 8);
        let stripe = rules_for_provider("stripe");
        assert_eq!(stripe.len(), 4);
        assert!(stripe.iter().all(|r| r.emit.domain == "Payment"));
        assert!(rules_for_provider("unknown-provider").is_empty());
    }

    #[test]
    fn test_all_rules_compile_and_have_unique_ids() {
        let rules = builtin_rules();
        assert!(rules.len() >= 25);
        let mut ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before, "duplicate rule id");
    }
}
