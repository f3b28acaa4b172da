use std::collections::BTreeMap;

use httpmock::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use time::macros::datetime;
use tunee_backend::{
    config::Config,
    models::payment::{
        GatewayOrderRequest, PayParams, ProviderCorrelation, ReportedAmount, TradeState,
    },
    services::{
        codec::Params,
        gateway::{AlipayClient, PaymentGateway, WechatPayClient},
        signature::wechat_sign,
    },
    ApiError,
};

use crate::support::{
    alipay_signer, params, signed_wechat_xml, test_config, ALIPAY_APP_ID, WECHAT_API_KEY,
    WECHAT_APP_ID, WECHAT_MCH_ID,
};

fn wechat_client(server: &MockServer) -> WechatPayClient {
    let mut config = test_config();
    config.payment.wechat.unified_order_url = server.url("/pay/unifiedorder");
    config.payment.wechat.order_query_url = server.url("/pay/orderquery");
    WechatPayClient::new(&config.payment.wechat, &config.payment.gateway).unwrap()
}

fn alipay_config(server: &MockServer) -> Config {
    let mut config = test_config();
    config.payment.alipay.gateway_url = server.url("/gateway.do");
    config
}

fn alipay_client(config: &Config) -> AlipayClient {
    AlipayClient::new(&config.payment.alipay, &config.payment.gateway, alipay_signer()).unwrap()
}

fn order_request(order_no: &str, amount: Decimal, openid: Option<&str>) -> GatewayOrderRequest {
    GatewayOrderRequest {
        order_no: order_no.to_string(),
        amount,
        subject: "Tunee 月卡会员".to_string(),
        client_ip: "203.0.113.7".to_string(),
        openid: openid.map(str::to_string),
        expire_at: datetime!(2025-01-01 04:30 UTC),
    }
}

fn wechat_response(extra: &[(&str, &str)]) -> String {
    let mut response = params(&[
        ("return_code", "SUCCESS"),
        ("return_msg", "OK"),
        ("appid", WECHAT_APP_ID),
        ("mch_id", WECHAT_MCH_ID),
        ("nonce_str", "IITRi8Iabbblz1Jc"),
    ]);
    for (k, v) in extra {
        response.insert(k.to_string(), v.to_string());
    }
    signed_wechat_xml(response)
}

#[tokio::test]
async fn test_wechat_unified_order_returns_signed_jsapi_params() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/pay/unifiedorder")
                .body_contains("<trade_type><![CDATA[JSAPI]]></trade_type>")
                .body_contains("<total_fee><![CDATA[1990]]></total_fee>")
                .body_contains("<openid><![CDATA[openid-g1]]></openid>")
                .body_contains("<time_expire><![CDATA[20250101123000]]></time_expire>");
            then.status(200).body(wechat_response(&[
                ("result_code", "SUCCESS"),
                ("trade_type", "JSAPI"),
                ("prepay_id", "wx201410272009395522657a690389285100"),
            ]));
        })
        .await;

    let created = wechat_client(&server)
        .create_order(&order_request(
            "TN202501011200001",
            Decimal::new(1990, 2),
            Some("openid-g1"),
        ))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(
        created.prepay_id.as_deref(),
        Some("wx201410272009395522657a690389285100")
    );
    assert_eq!(created.nonce_str.as_ref().map(String::len), Some(32));

    let PayParams::Wechat(pay) = created.params else {
        panic!("expected WeChat pay params");
    };
    assert_eq!(pay.app_id, WECHAT_APP_ID);
    assert_eq!(pay.package, "prepay_id=wx201410272009395522657a690389285100");
    assert_eq!(pay.sign_type, "MD5");

    let signed: Params = params(&[
        ("appId", &pay.app_id),
        ("timeStamp", &pay.time_stamp),
        ("nonceStr", &pay.nonce_str),
        ("package", &pay.package),
        ("signType", &pay.sign_type),
    ]);
    assert_eq!(pay.pay_sign, wechat_sign(&signed, WECHAT_API_KEY));
}

#[tokio::test]
async fn test_wechat_unified_order_surfaces_business_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/pay/unifiedorder");
            then.status(200).body(wechat_response(&[
                ("result_code", "FAIL"),
                ("err_code", "ORDERPAID"),
                ("err_code_des", "该订单已支付"),
            ]));
        })
        .await;

    let result = wechat_client(&server)
        .create_order(&order_request(
            "TN202501011200002",
            Decimal::new(1990, 2),
            Some("openid-g2"),
        ))
        .await;

    match result {
        Err(ApiError::Upstream(message)) => assert!(message.contains("该订单已支付")),
        other => panic!("expected upstream error, got {:?}", other.map(|c| c.prepay_id)),
    }
}

#[tokio::test]
async fn test_wechat_response_with_forged_signature_is_rejected() {
    let server = MockServer::start_async().await;
    let forged = wechat_response(&[
        ("result_code", "SUCCESS"),
        ("prepay_id", "wx_legit_prepay"),
    ])
    .replace("wx_legit_prepay", "wx_forged_prepay");
    server
        .mock_async(|when, then| {
            when.method(POST).path("/pay/unifiedorder");
            then.status(200).body(forged);
        })
        .await;

    let result = wechat_client(&server)
        .create_order(&order_request(
            "TN202501011200003",
            Decimal::new(1990, 2),
            Some("openid-g3"),
        ))
        .await;

    assert!(matches!(result, Err(ApiError::Upstream(_))));
}

#[tokio::test]
async fn test_wechat_order_without_openid_never_reaches_provider() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/pay/unifiedorder");
            then.status(200);
        })
        .await;

    let result = wechat_client(&server)
        .create_order(&order_request(
            "TN202501011200004",
            Decimal::new(1990, 2),
            None,
        ))
        .await;

    assert!(matches!(result, Err(ApiError::BadRequest(_))));
    mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_wechat_query_reports_paid_trade() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/pay/orderquery")
                .body_contains("<out_trade_no><![CDATA[TN202501011200005]]></out_trade_no>");
            then.status(200).body(wechat_response(&[
                ("result_code", "SUCCESS"),
                ("trade_state", "SUCCESS"),
                ("out_trade_no", "TN202501011200005"),
                ("transaction_id", "1008450740201411110005820873"),
                ("total_fee", "1990"),
            ]));
        })
        .await;

    let state = wechat_client(&server)
        .query_order("TN202501011200005")
        .await
        .unwrap();

    assert_eq!(
        state,
        TradeState::Paid {
            correlation: ProviderCorrelation::Wechat {
                transaction_id: "1008450740201411110005820873".to_string(),
            },
            amount: Some(ReportedAmount::Cents(1990)),
        }
    );
}

#[tokio::test]
async fn test_wechat_query_treats_unknown_order_as_unpaid() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/pay/orderquery");
            then.status(200).body(wechat_response(&[
                ("result_code", "FAIL"),
                ("err_code", "ORDERNOTEXIST"),
                ("err_code_des", "此交易订单号不存在"),
            ]));
        })
        .await;

    let state = wechat_client(&server)
        .query_order("TN202501011200006")
        .await
        .unwrap();

    assert_eq!(state, TradeState::Unpaid("ORDERNOTEXIST".to_string()));
}

#[tokio::test]
async fn test_server_errors_are_retried_once() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/pay/orderquery");
            then.status(503);
        })
        .await;

    let result = wechat_client(&server).query_order("TN202501011200007").await;

    assert!(matches!(result, Err(ApiError::Upstream(_))));
    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/pay/orderquery");
            then.status(400);
        })
        .await;

    let result = wechat_client(&server).query_order("TN202501011200008").await;

    assert!(matches!(result, Err(ApiError::Upstream(_))));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_alipay_order_string_is_signed_locally() {
    let server = MockServer::start_async().await;
    let config = alipay_config(&server);

    let created = alipay_client(&config)
        .create_order(&order_request(
            "TN202501011200009",
            Decimal::new(19900, 2),
            None,
        ))
        .await
        .unwrap();

    let PayParams::Alipay(order_string) = created.params else {
        panic!("expected Alipay order string");
    };
    assert!(created.prepay_id.is_none());

    let mut fields: BTreeMap<String, String> = serde_urlencoded::from_str(&order_string).unwrap();
    assert_eq!(fields["app_id"], ALIPAY_APP_ID);
    assert_eq!(fields["method"], "alipay.trade.app.pay");
    assert_eq!(fields["sign_type"], "RSA2");
    assert_eq!(fields["notify_url"], config.payment.alipay.notify_url);

    let biz: serde_json::Value = serde_json::from_str(&fields["biz_content"]).unwrap();
    assert_eq!(biz["out_trade_no"], "TN202501011200009");
    assert_eq!(biz["total_amount"], "199.00");
    assert_eq!(biz["product_code"], "QUICK_MSECURITY_PAY");
    assert_eq!(biz["time_expire"], "2025-01-01 12:30:00");

    let sign = fields.remove("sign").unwrap();
    assert!(alipay_signer().verify(&fields, &sign));
}

#[tokio::test]
async fn test_alipay_query_reports_paid_trade() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/gateway.do")
                .body_contains("method=alipay.trade.query");
            then.status(200)
                .header("content-type", "application/json;charset=utf-8")
                .body(
                    json!({
                        "alipay_trade_query_response": {
                            "code": "10000",
                            "msg": "Success",
                            "trade_no": "2025010122001400000000000010",
                            "out_trade_no": "TN202501011200010",
                            "trade_status": "TRADE_SUCCESS",
                            "total_amount": "199.00",
                            "buyer_user_id": "2088102122524333",
                            "buyer_logon_id": "159****5620"
                        },
                        "sign": "ERITJKEIJKJHKKKKKKKHJEREEEEEEEEEEE"
                    })
                    .to_string(),
                );
        })
        .await;

    let state = alipay_client(&alipay_config(&server))
        .query_order("TN202501011200010")
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(
        state,
        TradeState::Paid {
            correlation: ProviderCorrelation::Alipay {
                trade_no: "2025010122001400000000000010".to_string(),
                buyer_id: Some("2088102122524333".to_string()),
                buyer_logon_id: Some("159****5620".to_string()),
            },
            amount: Some(ReportedAmount::Decimal(Decimal::new(19900, 2))),
        }
    );
}

#[tokio::test]
async fn test_alipay_query_treats_missing_trade_as_unpaid() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/gateway.do");
            then.status(200).body(
                json!({
                    "alipay_trade_query_response": {
                        "code": "40004",
                        "msg": "Business Failed",
                        "sub_code": "ACQ.TRADE_NOT_EXIST",
                        "sub_msg": "交易不存在"
                    }
                })
                .to_string(),
            );
        })
        .await;

    let state = alipay_client(&alipay_config(&server))
        .query_order("TN202501011200011")
        .await
        .unwrap();

    assert_eq!(state, TradeState::Unpaid("ACQ.TRADE_NOT_EXIST".to_string()));
}

#[tokio::test]
async fn test_alipay_query_surfaces_other_business_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/gateway.do");
            then.status(200).body(
                json!({
                    "alipay_trade_query_response": {
                        "code": "40002",
                        "msg": "Invalid Arguments",
                        "sub_code": "isv.invalid-signature",
                        "sub_msg": "验签出错"
                    }
                })
                .to_string(),
            );
        })
        .await;

    let result = alipay_client(&alipay_config(&server))
        .query_order("TN202501011200012")
        .await;

    match result {
        Err(ApiError::Upstream(message)) => assert!(message.contains("验签出错")),
        other => panic!("expected upstream error, got {:?}", other),
    }
}
