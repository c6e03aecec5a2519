use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use metrics::counter;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use spend_goals_core::gateway::{DiscountGateway, DiscountSpec, GatewayError};
use spend_goals_core::types::{ExternalDiscountRef, Reward};

const BASIC_CREATE: &str = r#"
mutation discountAutomaticBasicCreate($discount: DiscountAutomaticBasicInput!) {
  discountAutomaticBasicCreate(automaticBasicDiscount: $discount) {
    automaticDiscountNode { id }
    userErrors { field code message }
  }
}"#;

const BASIC_UPDATE: &str = r#"
mutation discountAutomaticBasicUpdate($id: ID!, $discount: DiscountAutomaticBasicInput!) {
  discountAutomaticBasicUpdate(id: $id, automaticBasicDiscount: $discount) {
    automaticDiscountNode { id }
    userErrors { field code message }
  }
}"#;

const FREE_SHIPPING_CREATE: &str = r#"
mutation discountAutomaticFreeShippingCreate($discount: DiscountAutomaticFreeShippingInput!) {
  discountAutomaticFreeShippingCreate(freeShippingAutomaticDiscount: $discount) {
    automaticDiscountNode { id }
    userErrors { field code message }
  }
}"#;

const FREE_SHIPPING_UPDATE: &str = r#"
mutation discountAutomaticFreeShippingUpdate(
  $id: ID!
  $discount: DiscountAutomaticFreeShippingInput!
) {
  discountAutomaticFreeShippingUpdate(id: $id, freeShippingAutomaticDiscount: $discount) {
    automaticDiscountNode { id }
    userErrors { field code message }
  }
}"#;

const AUTOMATIC_DELETE: &str = r#"
mutation discountAutomaticDelete($id: ID!) {
  discountAutomaticDelete(id: $id) {
    deletedAutomaticDiscountId
    userErrors { field code message }
  }
}"#;

/// Client for the Shopify Admin GraphQL API, limited to automatic discounts.
#[derive(Clone)]
pub struct AdminClient {
    http: Client,
    endpoint: Url,
    access_token: String,
}

impl AdminClient {
    /// Creates a client that posts GraphQL documents to `endpoint`.
    pub fn new(access_token: impl Into<String>, endpoint: Url, http: Client) -> Self {
        Self {
            http,
            endpoint,
            access_token: access_token.into(),
        }
    }

    /// Builds the client for `https://{shop_domain}/admin/api/{api_version}/graphql.json`.
    pub fn for_shop(
        shop_domain: &str,
        api_version: &str,
        access_token: impl Into<String>,
        http: Client,
    ) -> Result<Self, url::ParseError> {
        let endpoint = Url::parse(&format!(
            "https://{shop_domain}/admin/api/{api_version}/graphql.json"
        ))?;
        Ok(Self::new(access_token, endpoint, http))
    }

    async fn mutate(
        &self,
        operation: &'static str,
        document: &str,
        variables: Value,
    ) -> Result<MutationPayload, GatewayError> {
        let result = self.send(operation, document, variables).await;
        let label = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        counter!("gateway_requests_total", "op" => operation, "result" => label).increment(1);
        result
    }

    async fn send(
        &self,
        operation: &'static str,
        document: &str,
        variables: Value,
    ) -> Result<MutationPayload, GatewayError> {
        debug!(stage = "gateway", operation, "sending admin mutation");
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await
            .map_err(classify_transport)?;

        let body: GraphqlResponse = parse_json(response).await?;
        if let Some(error) = body.errors.first() {
            let throttled = body.errors.iter().any(|err| {
                err.extensions
                    .as_ref()
                    .and_then(|ext| ext.code.as_deref())
                    == Some("THROTTLED")
            });
            warn!(
                stage = "gateway",
                operation,
                message = %error.message,
                throttled,
                "graphql error"
            );
            return Err(if throttled {
                GatewayError::Transient(error.message.clone())
            } else {
                GatewayError::Permanent(error.message.clone())
            });
        }

        let payload = body
            .data
            .and_then(|mut data| data.get_mut(operation).map(Value::take))
            .filter(|value| !value.is_null())
            .ok_or_else(|| GatewayError::Permanent(format!("missing {operation} payload")))?;

        serde_json::from_value(payload)
            .map_err(|err| GatewayError::Permanent(format!("invalid {operation} payload: {err}")))
    }
}

#[async_trait]
impl DiscountGateway for AdminClient {
    async fn create_discount(
        &self,
        spec: &DiscountSpec,
    ) -> Result<ExternalDiscountRef, GatewayError> {
        let mut input = discount_input(spec);
        input["startsAt"] = json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

        let (operation, document) = match spec.reward {
            Reward::FreeShipping => ("discountAutomaticFreeShippingCreate", FREE_SHIPPING_CREATE),
            _ => ("discountAutomaticBasicCreate", BASIC_CREATE),
        };

        let payload = self
            .mutate(operation, document, json!({ "discount": input }))
            .await?;
        payload.rejections()?;

        payload
            .automatic_discount_node
            .map(|node| node.id)
            .ok_or_else(|| GatewayError::Permanent(format!("{operation} returned no discount id")))
    }

    async fn update_discount(
        &self,
        external_ref: &str,
        spec: &DiscountSpec,
    ) -> Result<(), GatewayError> {
        let (operation, document) = match spec.reward {
            Reward::FreeShipping => ("discountAutomaticFreeShippingUpdate", FREE_SHIPPING_UPDATE),
            _ => ("discountAutomaticBasicUpdate", BASIC_UPDATE),
        };

        let payload = self
            .mutate(
                operation,
                document,
                json!({ "id": external_ref, "discount": discount_input(spec) }),
            )
            .await?;
        payload.rejections()
    }

    async fn delete_discount(&self, external_ref: &str) -> Result<(), GatewayError> {
        let payload = self
            .mutate(
                "discountAutomaticDelete",
                AUTOMATIC_DELETE,
                json!({ "id": external_ref }),
            )
            .await?;

        if payload.user_errors.iter().any(UserError::is_not_found) {
            return Err(GatewayError::NotFound);
        }
        payload.rejections()
    }
}

/// Builds the discount input shared by create and update mutations.
fn discount_input(spec: &DiscountSpec) -> Value {
    let mut input = json!({
        "title": spec.title,
        "minimumRequirement": {
            "subtotal": { "greaterThanOrEqualToAmount": money(spec.threshold_amount) }
        },
    });

    match spec.reward {
        Reward::FreeShipping => {
            input["destination"] = json!({ "all": true });
        }
        Reward::Percentage(percent) => {
            let fraction = (percent / Decimal::ONE_HUNDRED).to_f64().unwrap_or_default();
            input["customerGets"] = json!({
                "value": { "percentage": fraction },
                "items": { "all": true },
            });
        }
        Reward::FixedAmount(amount) => {
            input["customerGets"] = json!({
                "value": {
                    "discountAmount": { "amount": money(amount), "appliesOnEachItem": false }
                },
                "items": { "all": true },
            });
        }
    }

    input
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(default)]
    extensions: Option<GraphqlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorExtensions {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationPayload {
    #[serde(default)]
    automatic_discount_node: Option<DiscountNode>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

impl MutationPayload {
    fn rejections(&self) -> Result<(), GatewayError> {
        match self.user_errors.first() {
            Some(error) => Err(GatewayError::ValidationRejected {
                field: error.field.as_ref().map(|path| path.join(".")),
                message: error.message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscountNode {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserError {
    #[serde(default)]
    field: Option<Vec<String>>,
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl UserError {
    fn is_not_found(&self) -> bool {
        if self.code.as_deref() == Some("NOT_FOUND") {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        message.contains("does not exist") || message.contains("not found")
    }
}

fn classify_transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        GatewayError::Transient(err.to_string())
    } else {
        GatewayError::Permanent(err.to_string())
    }
}

async fn parse_json(response: Response) -> Result<GraphqlResponse, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        let message = format!("unexpected status {status}: {body}");
        return Err(if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            GatewayError::Transient(message)
        } else {
            GatewayError::Permanent(message)
        });
    }

    response
        .json()
        .await
        .map_err(|err| GatewayError::Permanent(format!("invalid response body: {err}")))
}
