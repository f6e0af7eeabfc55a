//! Scripted collaborators for unit tests
//!
//! `ScriptedTransport` answers requests by URL substring; `ScriptedModel`
//! answers prompts by the agent banner each stage template opens with.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

use crate::error::AnalystError;
use crate::gemini::CompletionModel;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::Result;

struct Route {
    pattern: String,
    queue: VecDeque<HttpResponse>,
    sticky: Option<HttpResponse>,
}

/// Transport that replays canned responses.
///
/// A route's queued responses are served in order; once drained the last
/// one keeps being served.
pub(crate) struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<(HttpRequest, Instant)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn route(&self, pattern: &str, responses: Vec<HttpResponse>) {
        self.routes.lock().unwrap().push(Route {
            pattern: pattern.to_string(),
            queue: responses.into(),
            sticky: None,
        });
    }

    pub fn route_always(&self, pattern: &str, response: HttpResponse) {
        self.route(pattern, vec![response]);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    pub fn requests_to(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.url.contains(pattern))
            .count()
    }

    pub fn sent_at(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    /// CoinGecko routes for a healthy market: $65,000 now, $64,000 before.
    pub fn with_healthy_market(self) -> Self {
        self.route_always(
            "/simple/price",
            HttpResponse::new(200, r#"{"bitcoin":{"usd":65000}}"#),
        );
        self.route_always(
            "/market_chart",
            HttpResponse::new(
                200,
                r#"{"prices":[[1700000000000,64000],[1700003600000,65000]],
                    "market_caps":[[1700003600000,1280000000000]],
                    "total_volumes":[[1700003600000,35000000000]]}"#,
            ),
        );
        self.route_always(
            "/search/trending",
            HttpResponse::new(
                200,
                r#"{"coins":[{"item":{"id":"pepe","name":"Pepe","symbol":"pepe","price_btc":0.0000001}}]}"#,
            ),
        );
        self
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), Instant::now()));

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .find(|r| request.url.contains(&r.pattern))
            .ok_or_else(|| {
                AnalystError::UnexpectedStatus {
                    status: 404,
                    body: format!("no scripted route for {}", request.url),
                }
            })?;

        if let Some(next) = route.queue.pop_front() {
            route.sticky = Some(next.clone());
            return Ok(next);
        }

        route.sticky.clone().ok_or_else(|| AnalystError::UnexpectedStatus {
            status: 404,
            body: format!("route {} has no responses", route.pattern),
        })
    }
}

/// Canned stage outputs keyed by the agent banner in the prompt
pub(crate) struct ScriptedModel {
    prompts: Mutex<Vec<String>>,
    failing_banner: Option<&'static str>,
    fixed_reply: Option<&'static str>,
    yield_between: bool,
}

pub(crate) const MARKET_OUTPUT: &str = "QUESTION TYPE: Yes/No\nDIRECT FACTORS:\n- Momentum: positive";
pub(crate) const TECHNICAL_OUTPUT: &str = "TECHNICAL ASSESSMENT:\n- Higher highs on the hourly chart";
pub(crate) const NEWS_OUTPUT: &str = "NEWS IMPACT ANALYSIS:\nTrending data is quiet.";
pub(crate) const SYNTHESIS_OUTPUT: &str =
    "ANSWER: YES\nKEY REASONS:\n- Momentum is positive\n- Volume is healthy\nSUPPORTING EVIDENCE:\nPrice rose 1.56% in the last hour.";

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            failing_banner: None,
            fixed_reply: None,
            yield_between: false,
        }
    }

    /// Fail every prompt that contains `banner`.
    pub fn failing_on(mut self, banner: &'static str) -> Self {
        self.failing_banner = Some(banner);
        self
    }

    /// Answer every prompt with `reply`.
    pub fn answering(mut self, reply: &'static str) -> Self {
        self.fixed_reply = Some(reply);
        self
    }

    /// Yield to the scheduler before answering so concurrent runs interleave.
    pub fn yielding(mut self) -> Self {
        self.yield_between = true;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if self.yield_between {
            tokio::task::yield_now().await;
        }

        if let Some(banner) = self.failing_banner {
            if prompt.contains(banner) {
                return Err(AnalystError::FetchExhausted {
                    endpoint: "gemini".into(),
                    attempts: 3,
                    message: "Unexpected HTTP status 503: overloaded".into(),
                });
            }
        }

        let output = if let Some(reply) = self.fixed_reply {
            reply
        } else if prompt.contains("Market Analysis Agent") {
            MARKET_OUTPUT
        } else if prompt.contains("Technical Analysis Agent") {
            TECHNICAL_OUTPUT
        } else if prompt.contains("News Analysis Agent") {
            NEWS_OUTPUT
        } else {
            SYNTHESIS_OUTPUT
        };

        Ok(output.to_string())
    }
}
