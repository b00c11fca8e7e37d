use crate::http_server::status::Status;
use actix_web::http::header::ContentType;
use actix_web::web::Data;
use actix_web::{HttpResponse, Responder};
use std::sync::{Arc, RwLock};

pub(super) async fn status_handler(status: Data<Arc<RwLock<Status>>>) -> impl Responder {
    let body = match status.read() {
        Ok(guard) => serde_json::to_string(&*guard).unwrap_or_default(),
        Err(poisoned) => serde_json::to_string(&*poisoned.into_inner()).unwrap_or_default(),
    };

    HttpResponse::Ok().content_type(ContentType::json()).body(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ScalingStatus;
    use actix_web::body::MessageBody;
    use actix_web::test::TestRequest;
    use actix_web::Responder;
    use std::collections::BTreeMap;

    #[actix_web::test]
    async fn handler_serves_the_current_snapshot() {
        let mut status = Status::default();
        status.update_scaling(&ScalingStatus {
            active_nodes: 1,
            ..Default::default()
        });
        status.replace_nodes(BTreeMap::from([("node-1".to_string(), "up-to-date".to_string())]));

        let data = Data::new(Arc::new(RwLock::new(status)));
        let responder = status_handler(data).await;

        let request = TestRequest::default().to_http_request();
        let response = responder.respond_to(&request);

        let expected_body = r#"{"scaling":{"active_nodes":1,"to_launch":{},"to_terminate":[],"unschedulable_count":0},"nodes":{"node-1":"up-to-date"}}"#;

        assert_eq!(
            expected_body,
            response.map_into_boxed_body().into_body().try_into_bytes().unwrap()
        );
    }
}
