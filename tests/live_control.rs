mod common;

use common::{Call, RecordingStack};
use grow_light_controller::*;

fn sent_commands(stack: &RecordingStack) -> Vec<String> {
    stack
        .writes()
        .into_iter()
        .map(|(service, characteristic, data, mode)| {
            assert_eq!(service, LIVE_SERVICE_UUID);
            assert_eq!(characteristic, LIVE_CHARACTERISTIC_UUID);
            assert_eq!(mode, WriteMode::WithoutResponse);
            String::from_utf8(data).unwrap()
        })
        .collect()
}

#[tokio::test]
async fn connect_discovers_before_first_command() {
    let stack = RecordingStack::new();
    let device = DeviceRef::new("grow-01").unwrap();

    let mut light = GrowLight::connect(&stack, &device).await.unwrap();
    light.power_on().await.unwrap();

    let calls = stack.calls();
    assert_eq!(calls[0], Call::Connect("grow-01".into()));
    assert_eq!(calls[1], Call::Discover);
    assert_eq!(sent_commands(&stack), vec!["R0;S0"]);
}

#[tokio::test]
async fn failed_discovery_closes_the_link() {
    let stack = RecordingStack {
        fail_discover: true,
        ..RecordingStack::new()
    };
    let device = DeviceRef::new("grow-01").unwrap();

    let result = GrowLight::connect(&stack, &device).await;

    assert!(matches!(result, Err(Error::CharacteristicNotFound(_))));
    assert_eq!(
        stack.calls(),
        vec![Call::Connect("grow-01".into()), Call::Discover, Call::Disconnect]
    );
}

#[tokio::test]
async fn intensity_only_reaches_device_while_on() {
    let stack = RecordingStack::new();
    let device = DeviceRef::new("grow-01").unwrap();
    let mut light = GrowLight::connect(&stack, &device).await.unwrap();

    light
        .set_intensity(Intensity::saturating(40), Intensity::MIN)
        .await
        .unwrap();
    assert!(sent_commands(&stack).is_empty());

    light.toggle().await.unwrap();
    light
        .set_intensity(Intensity::saturating(55), Intensity::saturating(10))
        .await
        .unwrap();
    light.toggle().await.unwrap();

    assert!(!light.is_on);
    assert_eq!(
        sent_commands(&stack),
        vec!["R40;S0", "R55;S10", "light_off"]
    );
}

#[tokio::test]
async fn scheduler_starts_from_live_levels() {
    let stack = RecordingStack::new();
    let device = DeviceRef::new("grow-01").unwrap();
    let mut light = GrowLight::connect(&stack, &device).await.unwrap();
    light
        .set_intensity(Intensity::saturating(40), Intensity::saturating(5))
        .await
        .unwrap();

    let schedule = light.scheduler_seed();
    assert_eq!(schedule.red_light.intensity.value(), 40);
    assert_eq!(schedule.sunlight.intensity.value(), 5);
    assert_eq!(schedule.red_light.start, None);
    assert_eq!(schedule.days, DaySelection::default());

    light.disconnect().await.unwrap();
    assert_eq!(stack.calls().last(), Some(&Call::Disconnect));
}

#[tokio::test]
async fn rejected_write_leaves_power_state_unchanged() {
    let stack = RecordingStack {
        fail_write: true,
        ..RecordingStack::new()
    };
    let device = DeviceRef::new("grow-01").unwrap();
    let mut light = GrowLight::connect(&stack, &device).await.unwrap();

    assert!(light.power_on().await.is_err());
    assert!(!light.is_on);
}
