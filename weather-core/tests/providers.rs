//! Provider clients against a mock HTTP server.

use weather_core::{
    Coordinate, FetchError, WeatherFetcher,
    provider::{openmeteo::OpenMeteoProvider, openweather::OpenWeatherProvider},
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BERLIN: Coordinate = Coordinate::new(52.52, 13.41);

fn one_call_body(dt: i64) -> serde_json::Value {
    serde_json::json!({
        "lat": 52.52, "lon": 13.41,
        "timezone": "Europe/Berlin",
        "timezone_offset": 3600,
        "current": {
            "dt": dt, "sunrise": dt - 20000, "sunset": dt + 10000,
            "temp": 7.3, "wind_speed": 2.5,
            "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}]
        },
        "daily": [
            {"dt": dt + 86400, "temp": {"day": 8.0, "min": 3.0, "max": 9.0}, "wind_speed": 4.0,
             "weather": [{"id": 500, "description": "light rain", "icon": "10d"}], "rain": 1.4},
            {"dt": dt, "temp": {"day": 7.0, "min": 2.0, "max": 8.0}, "wind_speed": 3.0,
             "weather": [{"id": 803, "description": "broken clouds", "icon": "04d"}]}
        ]
    })
}

#[tokio::test]
async fn openweather_fetches_one_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall"))
        .and(query_param("appid", "KEY"))
        .and(query_param("units", "metric"))
        .and(query_param("lat", "52.52"))
        .and(query_param("lon", "13.41"))
        .respond_with(ResponseTemplate::new(200).set_body_json(one_call_body(1_700_000_000)))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenWeatherProvider::new("KEY".into()).with_base_url(server.uri());
    let snap = provider.fetch(&BERLIN).await.unwrap();

    assert_eq!(snap.location, BERLIN);
    assert_eq!(snap.timezone_offset_seconds, 3600);
    assert_eq!(snap.current.observed_at.timestamp(), 1_700_000_000);
    assert_eq!(snap.current.description, "broken clouds");
    assert_eq!(snap.current.wind_speed_kph, 9.0);
    assert_eq!(snap.daily.len(), 2);
    assert!(snap.daily[0].date < snap.daily[1].date);
}

#[tokio::test]
async fn openweather_unauthorized_is_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall"))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"cod":401,"message":"Invalid API key"}"#))
        .mount(&server)
        .await;

    let provider = OpenWeatherProvider::new("BAD".into()).with_base_url(server.uri());
    match provider.fetch(&BERLIN).await {
        Err(FetchError::Status { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid API key"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn openweather_garbage_body_is_invalid_data() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/3.0/onecall"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let provider = OpenWeatherProvider::new("KEY".into()).with_base_url(server.uri());
    assert!(matches!(provider.fetch(&BERLIN).await, Err(FetchError::InvalidData(_))));
}

#[tokio::test]
async fn openmeteo_fetches_forecast() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("timeformat", "unixtime"))
        .and(query_param("latitude", "52.52"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "latitude": 52.52, "longitude": 13.419998,
            "utc_offset_seconds": 3600,
            "current": {"time": 1700000100, "interval": 900, "temperature_2m": 6.1,
                        "weather_code": 61, "is_day": 1, "rain": 0.3, "snowfall": 0.0,
                        "wind_speed_10m": 11.5},
            "daily": {
                "time": [1699999200, 1700085600],
                "weather_code": [61, 2],
                "temperature_2m_max": [8.2, 9.0],
                "temperature_2m_min": [3.1, 2.4],
                "rain_sum": [2.0, 0.0],
                "snowfall_sum": [0.0, 0.0],
                "wind_speed_10m_max": [18.0, 12.0],
                "sunrise": [1700029000, 1700115500],
                "sunset": [1700060500, 1700146800]
            }
        })))
        .mount(&server)
        .await;

    let provider = OpenMeteoProvider::new().with_base_url(server.uri());
    let snap = provider.fetch(&BERLIN).await.unwrap();

    // the requested coordinate is kept, not the grid cell the API snapped to
    assert_eq!(snap.location, BERLIN);
    assert_eq!(snap.current.observed_at.timestamp(), 1_700_000_100);
    assert_eq!(snap.current.description, "rain");
    assert!(!snap.current.is_night);
    assert_eq!(snap.daily.len(), 2);
}

#[tokio::test]
async fn openmeteo_server_error_is_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = OpenMeteoProvider::new().with_base_url(server.uri());
    assert!(matches!(
        provider.fetch(&BERLIN).await,
        Err(FetchError::Status { status: 503, .. })
    ));
}

#[tokio::test]
async fn unreachable_host_is_network_error() {
    // nothing listens on the discard port
    let provider = OpenMeteoProvider::new().with_base_url("http://127.0.0.1:9");
    assert!(matches!(provider.fetch(&BERLIN).await, Err(FetchError::Network(_))));
}
