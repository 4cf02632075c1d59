use checkwright_license::{
    current_device_id, is_valid_device_id, DeviceFingerprint, DeviceId, DeviceIdentity,
    DeviceInfo, FixedDevice, HostDevice, LicenseError, DEVICE_ID_LEN,
};

fn info(hostname: &str, cpu: &str) -> DeviceInfo {
    DeviceInfo {
        hostname: hostname.into(),
        os_name: "linux".into(),
        arch: "x86_64".into(),
        cpu_model: cpu.into(),
    }
}

#[test]
fn device_info_collection() {
    let info = DeviceInfo::collect();
    assert!(!info.os_name.is_empty());
    assert!(!info.arch.is_empty());
}

#[test]
fn device_info_serde() {
    let info = DeviceInfo::collect();
    let json = serde_json::to_string(&info).unwrap();
    let parsed: DeviceInfo = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.os_name, info.os_name);
    assert_eq!(parsed.arch, info.arch);
}

#[test]
fn fingerprint_generation() {
    let fp = DeviceFingerprint::generate();
    assert!(is_valid_device_id(fp.id().as_str()));
    assert_eq!(fp.id().as_str().len(), DEVICE_ID_LEN);
    assert!(fp.matches_current());
}

#[test]
fn fingerprint_stability() {
    let fp1 = DeviceFingerprint::generate();
    let fp2 = DeviceFingerprint::generate();
    assert_eq!(fp1.id(), fp2.id());
}

#[test]
fn fingerprint_depends_on_hardware() {
    let a = DeviceFingerprint::from_info(&info("desk", "Ryzen 7"));
    let b = DeviceFingerprint::from_info(&info("desk", "Core i9"));
    assert_ne!(a.id(), b.id());
}

#[test]
fn fingerprint_with_missing_signals_is_still_valid_and_stable() {
    let empty = info("", "");
    let a = DeviceFingerprint::from_info(&empty);
    let b = DeviceFingerprint::from_info(&empty);
    assert_eq!(a, b);
    assert!(is_valid_device_id(a.id().as_str()));
}

#[test]
fn current_device_id_is_cached() {
    let a = current_device_id();
    let b = current_device_id();
    assert!(std::ptr::eq(a, b));
    assert_eq!(HostDevice.device_id(), *a);
}

#[test]
fn device_id_format_checker() {
    assert!(is_valid_device_id("0123456789abcdef0123456789abcdef"));
    assert!(!is_valid_device_id("0123456789ABCDEF0123456789ABCDEF"));
    assert!(!is_valid_device_id("0123456789abcdef"));
    assert!(!is_valid_device_id("0123456789abcdef0123456789abcdeg"));
    assert!(!is_valid_device_id(""));
}

#[test]
fn device_id_parse_rejects_garbage() {
    let err = DeviceId::parse("not-a-device").unwrap_err();
    assert!(matches!(err, LicenseError::InvalidDeviceId(_)));
}

#[test]
fn device_id_deserialize_validates() {
    let ok: Result<DeviceId, _> = serde_json::from_str(r#""0123456789abcdef0123456789abcdef""#);
    assert!(ok.is_ok());
    let bad: Result<DeviceId, _> = serde_json::from_str(r#""xyz""#);
    assert!(bad.is_err());
}

#[test]
fn fixed_device_reports_its_id() {
    let id = DeviceId::parse("fedcba9876543210fedcba9876543210").unwrap();
    assert_eq!(FixedDevice(id.clone()).device_id(), id);
}
