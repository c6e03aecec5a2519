use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use spend_goals_core::progress::CartProgress;
use spend_goals_core::types::{GoalFields, SpendingGoal, TierType};

use crate::bulk::GoalMutation;
use crate::envelope::{ApiError, Envelope, ErrorBody};
use crate::router::AppState;
use crate::sync::SyncError;

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ShopQuery {
    shop: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    shop: String,
    subtotal: String,
}

/// Goal payload as sent by the storefront editor.
///
/// Values arrive loosely typed, so numbers are kept as raw JSON until
/// [`GoalPayload::into_mutation`] coerces them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPayload {
    #[serde(default, alias = "tenant")]
    shop: Option<String>,
    #[serde(default, alias = "id")]
    goal_id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "spendingGoal")]
    threshold_amount: Value,
    #[serde(default, alias = "selectedTab")]
    tier_type: Value,
    #[serde(default)]
    tier_value: Value,
    #[serde(default)]
    percentage_discount: Value,
    #[serde(default)]
    fixed_amount_discount: Value,
    #[serde(default, alias = "announcement")]
    announcement_template: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkPayload {
    shop: String,
    #[serde(alias = "spendingGoals")]
    goals: Vec<GoalPayload>,
}

impl GoalPayload {
    fn tenant(&self) -> Result<String, ApiError> {
        match self.shop.as_deref().map(str::trim) {
            Some(shop) if !shop.is_empty() => Ok(shop.to_string()),
            _ => Err(ApiError::bad_request("missing shop")),
        }
    }

    pub fn into_mutation(self) -> Result<GoalMutation, ApiError> {
        let tier_type = parse_tier_type(&self.tier_type)
            .ok_or_else(|| ApiError::invalid_field("tierType"))?;

        let fallback = match tier_type {
            TierType::Percentage => &self.percentage_discount,
            TierType::FixedAmount => &self.fixed_amount_discount,
            TierType::FreeShipping => &Value::Null,
        };
        let tier_value = coerce_decimal(&self.tier_value).or_else(|| coerce_decimal(fallback));

        Ok(GoalMutation {
            goal_id: coerce_id(&self.goal_id),
            fields: GoalFields {
                title: self.title.unwrap_or_default(),
                threshold_amount: coerce_decimal(&self.threshold_amount),
                tier_type,
                tier_value,
                announcement_template: self.announcement_template.unwrap_or_default(),
            },
        })
    }
}

/// Accepts a JSON number or a numeric string. Anything else counts as absent.
fn coerce_decimal(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        return None;
    }
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&raw).ok())
}

fn coerce_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Accepts the wire name or the editor's tab index, as a number or a string.
fn parse_tier_type(value: &Value) -> Option<TierType> {
    match value {
        Value::Number(number) => number.as_u64().and_then(TierType::from_tab_index),
        Value::String(text) => {
            let text = text.trim();
            text.parse()
                .ok()
                .or_else(|| text.parse::<u64>().ok().and_then(TierType::from_tab_index))
        }
        _ => None,
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

pub async fn list_goals(
    State(state): State<AppState>,
    params: Result<Query<ShopQuery>, QueryRejection>,
) -> ApiResult<Vec<SpendingGoal>> {
    let params = query(params)?;
    let goals = state.orchestrator().list(&params.shop).await?;
    Ok(Json(Envelope::ok(goals)))
}

pub async fn create_goal(
    State(state): State<AppState>,
    payload: Result<Json<GoalPayload>, JsonRejection>,
) -> ApiResult<SpendingGoal> {
    let payload = json_body(payload)?;
    let tenant = payload.tenant()?;
    let mutation = payload.into_mutation()?;

    match state.orchestrator().create(&tenant, &mutation.fields).await {
        Ok(goal) => Ok(Json(Envelope::ok(goal))),
        Err(err) => Err(compensate(&state, err).await),
    }
}

pub async fn update_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
    payload: Result<Json<GoalPayload>, JsonRejection>,
) -> ApiResult<SpendingGoal> {
    let payload = json_body(payload)?;
    let tenant = payload.tenant()?;
    let mutation = payload.into_mutation()?;

    match state
        .orchestrator()
        .update(&tenant, &goal_id, &mutation.fields)
        .await
    {
        Ok(goal) => Ok(Json(Envelope::ok(goal))),
        Err(err) => Err(compensate(&state, err).await),
    }
}

pub async fn delete_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<String>,
    params: Result<Query<ShopQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let params = query(params)?;
    state.orchestrator().delete(&params.shop, &goal_id).await?;
    Ok(Json(Envelope::ok(serde_json::json!({ "goalId": goal_id }))))
}

pub async fn bulk_save(
    State(state): State<AppState>,
    payload: Result<Json<BulkPayload>, JsonRejection>,
) -> ApiResult<Vec<Envelope<SpendingGoal>>> {
    let payload = json_body(payload)?;
    let tenant = payload.shop.trim().to_string();
    if tenant.is_empty() {
        return Err(ApiError::bad_request("missing shop"));
    }

    let parsed: Vec<Result<GoalMutation, ApiError>> = payload
        .goals
        .into_iter()
        .map(GoalPayload::into_mutation)
        .collect();
    let mutations = parsed
        .iter()
        .filter_map(|item| item.as_ref().ok().cloned())
        .collect();
    let mut outcomes = state.reconciler().reconcile(&tenant, mutations).await.into_iter();

    let mut items = Vec::with_capacity(parsed.len());
    for item in parsed {
        let envelope = match item {
            Err(err) => Envelope::failed(err.into_body()),
            Ok(_) => match outcomes.next() {
                Some(Ok(goal)) => Envelope::ok(goal),
                Some(Err(err)) => Envelope::failed(compensate(&state, err).await.into_body()),
                None => Envelope::failed(ErrorBody::new("internal", "missing bulk outcome")),
            },
        };
        items.push(envelope);
    }

    let success = items.iter().all(|item| item.success);
    Ok(Json(Envelope {
        success,
        data: Some(items),
        error: None,
    }))
}

pub async fn cart_progress(
    State(state): State<AppState>,
    params: Result<Query<ProgressQuery>, QueryRejection>,
) -> ApiResult<CartProgress> {
    let params = query(params)?;
    let subtotal = coerce_decimal(&Value::String(params.subtotal))
        .filter(|subtotal| *subtotal >= Decimal::ZERO)
        .ok_or_else(|| ApiError::invalid_field("subtotal"))?;
    let goals = state.orchestrator().list(&params.shop).await?;
    Ok(Json(Envelope::ok(CartProgress::evaluate(&goals, subtotal))))
}

/// Turns a failed mutation into a response, removing any orphaned discount first.
///
/// The orphaned reference is only reported back when the cleanup also failed.
async fn compensate(state: &AppState, err: SyncError) -> ApiError {
    let orphan = match &err {
        SyncError::Persistence {
            orphaned_discount: Some(external_ref),
            ..
        } => external_ref.clone(),
        _ => return ApiError::from(err),
    };

    match state.orchestrator().discard_orphan(&orphan).await {
        Ok(()) => {
            info!(stage = "http", external_ref = %orphan, "orphaned discount compensated");
            ApiError::from(err).without_orphan()
        }
        Err(cleanup) => {
            warn!(
                stage = "http",
                external_ref = %orphan,
                error = %cleanup,
                "failed to remove orphaned discount"
            );
            ApiError::from(err)
        }
    }
}
