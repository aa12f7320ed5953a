//! Discovery and HID register access for the XR2280x USB bridge.

use crate::consts;
use crate::error::{Error, Result};
use hidapi::{HidApi, HidDevice};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A discovered bridge, with its logical HID interfaces grouped by serial number.
#[derive(Debug, Clone)]
pub struct XrDeviceInfo {
    pub vid: u16,
    pub serial_number: Option<String>,
    pub product_string: Option<String>,
    /// I2C interface, the expander bus.
    pub i2c_interface: Option<InterfaceInfo>,
    /// EDGE (GPIO/Interrupt) interface, the on-board pins.
    pub edge_interface: Option<InterfaceInfo>,
}

/// A single USB HID interface.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub vid: u16,
    pub pid: u16,
    pub path: std::ffi::CString,
    pub serial_number: Option<String>,
    pub product_string: Option<String>,
}

/// Finds all XR2280x bridges, ordered by serial number.
pub fn device_find_all(hid_api: &HidApi) -> Vec<XrDeviceInfo> {
    let mut by_serial: HashMap<String, XrDeviceInfo> = HashMap::new();
    let mut without_serial = Vec::new();

    for info in hid_api.device_list().filter(|info| {
        info.vendor_id() == consts::EXAR_VID
            && (info.product_id() == consts::XR2280X_I2C_PID
                || info.product_id() == consts::XR2280X_EDGE_PID)
    }) {
        debug!(
            "Found XR2280x interface: VID={:04X}, PID={:04X}, Path={:?}, SN={:?}",
            info.vendor_id(),
            info.product_id(),
            info.path(),
            info.serial_number()
        );
        let interface = InterfaceInfo {
            vid: info.vendor_id(),
            pid: info.product_id(),
            path: info.path().to_owned(),
            serial_number: info.serial_number().map(str::to_string),
            product_string: info.product_string().map(str::to_string),
        };
        match interface.serial_number.clone() {
            Some(serial) => {
                let device = by_serial
                    .entry(serial)
                    .or_insert_with(|| empty_device(&interface));
                attach_interface(device, interface);
            }
            None => {
                let mut device = empty_device(&interface);
                attach_interface(&mut device, interface);
                without_serial.push(device);
            }
        }
    }

    let mut devices: Vec<XrDeviceInfo> = by_serial.into_values().collect();
    devices.sort_by(|a, b| a.serial_number.cmp(&b.serial_number));
    devices.extend(without_serial);
    devices
}

fn empty_device(interface: &InterfaceInfo) -> XrDeviceInfo {
    XrDeviceInfo {
        vid: interface.vid,
        serial_number: interface.serial_number.clone(),
        product_string: interface.product_string.clone(),
        i2c_interface: None,
        edge_interface: None,
    }
}

fn attach_interface(device: &mut XrDeviceInfo, interface: InterfaceInfo) {
    if interface.pid == consts::XR2280X_I2C_PID {
        device.i2c_interface = Some(interface);
    } else {
        device.edge_interface = Some(interface);
    }
}

/// Finds the first bridge. **Warning:** ambiguous if several are connected.
pub fn device_find_first(hid_api: &HidApi) -> Result<XrDeviceInfo> {
    device_find_all(hid_api)
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound)
}

/// Identification strings of an opened bridge.
#[derive(Debug, Clone)]
pub struct XrDeviceDetails {
    pub vendor_id: u16,
    pub serial_number: Option<String>,
    pub product_string: Option<String>,
    pub manufacturer_string: Option<String>,
}

/// Detected capabilities of the connected bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Number of GPIO pins controllable via the EDGE interface (8 or 32).
    pub gpio_count: u8,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities { gpio_count: 8 }
    }
}

/// A handle to an opened XR2280x bridge.
///
/// Each HID interface sits behind its own mutex so the handle can be shared
/// between pins, expanders and the edge watcher thread. A transaction holds the
/// lock for its full request/response exchange.
#[derive(Debug)]
pub struct Xr2280x {
    i2c_device: Option<Mutex<HidDevice>>,
    edge_device: Option<Mutex<HidDevice>>,
    info: XrDeviceDetails,
    capabilities: Capabilities,
}

impl Xr2280x {
    pub fn device_enumerate(hid_api: &HidApi) -> Vec<XrDeviceInfo> {
        device_find_all(hid_api)
    }

    /// Opens both interfaces of a discovered bridge, where present.
    pub fn device_open(hid_api: &HidApi, info: &XrDeviceInfo) -> Result<Self> {
        let open = |interface: &Option<InterfaceInfo>, name: &str| -> Result<Option<HidDevice>> {
            interface
                .as_ref()
                .map(|i| {
                    hid_api
                        .open_path(&i.path)
                        .map_err(|e| Error::DeviceNotFoundByPath {
                            path: format!("{:?}", i.path),
                            message: format!("Failed to open {} interface: {}", name, e),
                        })
                })
                .transpose()
        };
        let i2c_device = open(&info.i2c_interface, "I2C")?;
        let edge_device = open(&info.edge_interface, "EDGE")?;
        Self::from_hid_devices(i2c_device, edge_device)
    }

    /// Opens the first bridge found.
    pub fn device_open_first(hid_api: &HidApi) -> Result<Self> {
        let info = device_find_first(hid_api)?;
        Self::device_open(hid_api, &info)
    }

    /// Builds a handle from already opened interfaces and probes the GPIO count.
    pub fn from_hid_devices(
        i2c_device: Option<HidDevice>,
        edge_device: Option<HidDevice>,
    ) -> Result<Self> {
        let info_device = edge_device
            .as_ref()
            .or(i2c_device.as_ref())
            .ok_or(Error::DeviceNotFound)?;
        let hid_info = info_device.get_device_info()?;
        let info = XrDeviceDetails {
            vendor_id: hid_info.vendor_id(),
            serial_number: info_device.get_serial_number_string()?,
            product_string: info_device.get_product_string()?,
            manufacturer_string: info_device.get_manufacturer_string()?,
        };
        trace!("Device Info: {:?}", info);

        let mut bridge = Xr2280x {
            i2c_device: i2c_device.map(Mutex::new),
            edge_device: edge_device.map(Mutex::new),
            info,
            capabilities: Capabilities::default(),
        };
        if bridge.edge_device.is_some() {
            bridge.capabilities = match bridge.read_edge_register(consts::edge::REG_FUNC_SEL_1) {
                Ok(_) => {
                    debug!("Detected support for 32 GPIOs");
                    Capabilities { gpio_count: 32 }
                }
                Err(Error::FeatureReportError { .. }) => {
                    debug!("Detected support for 8 GPIOs");
                    Capabilities { gpio_count: 8 }
                }
                Err(e) => {
                    warn!("Error during capability detection: {}", e);
                    return Err(e);
                }
            };
        }
        Ok(bridge)
    }

    pub fn get_device_info(&self) -> &XrDeviceDetails {
        &self.info
    }

    pub fn get_capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has_i2c(&self) -> bool {
        self.i2c_device.is_some()
    }

    pub fn has_edge(&self) -> bool {
        self.edge_device.is_some()
    }

    pub(crate) fn i2c_interface(&self) -> Result<&Mutex<HidDevice>> {
        self.i2c_device.as_ref().ok_or(Error::DeviceNotFound)
    }

    pub(crate) fn edge_interface(&self) -> Result<&Mutex<HidDevice>> {
        self.edge_device.as_ref().ok_or_else(|| {
            Error::UnsupportedFeature("EDGE interface not available on this handle".to_string())
        })
    }

    pub(crate) fn lock<'a>(&self, device: &'a Mutex<HidDevice>) -> MutexGuard<'a, HidDevice> {
        device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Register Access ---

    pub(crate) fn write_i2c_register(&self, reg_addr: u16, value: u16) -> Result<()> {
        write_hid_register(&self.lock(self.i2c_interface()?), reg_addr, value)
    }

    pub(crate) fn write_edge_register(&self, reg_addr: u16, value: u16) -> Result<()> {
        write_hid_register(&self.lock(self.edge_interface()?), reg_addr, value)
    }

    pub(crate) fn read_edge_register(&self, reg_addr: u16) -> Result<u16> {
        read_hid_register(&self.lock(self.edge_interface()?), reg_addr)
    }
}

fn write_hid_register(device: &HidDevice, reg_addr: u16, value: u16) -> Result<()> {
    let [addr_lo, addr_hi] = reg_addr.to_le_bytes();
    let [val_lo, val_hi] = value.to_le_bytes();
    let buf = [
        consts::REPORT_ID_WRITE_HID_REGISTER,
        addr_lo,
        addr_hi,
        val_lo,
        val_hi,
    ];
    trace!("Write Reg {:04X} = {:04X}: {:02X?}", reg_addr, value, buf);
    device.send_feature_report(&buf).map_err(|e| {
        trace!("send_feature_report error: {}", e);
        Error::FeatureReportError { reg_addr }
    })
}

fn read_hid_register(device: &HidDevice, reg_addr: u16) -> Result<u16> {
    let [addr_lo, addr_hi] = reg_addr.to_le_bytes();
    device
        .send_feature_report(&[consts::REPORT_ID_SET_HID_READ_ADDRESS, addr_lo, addr_hi])
        .map_err(|e| {
            trace!("send_feature_report error: {}", e);
            Error::FeatureReportError { reg_addr }
        })?;
    let mut buf = [consts::REPORT_ID_READ_HID_REGISTER, 0, 0];
    match device.get_feature_report(&mut buf) {
        Ok(len) if len == buf.len() && buf[0] == consts::REPORT_ID_READ_HID_REGISTER => {
            let value = u16::from_le_bytes([buf[1], buf[2]]);
            trace!("Read Reg 0x{:04X} = 0x{:04X}", reg_addr, value);
            Ok(value)
        }
        Ok(len) => {
            warn!(
                "get_feature_report returned unexpected report: id={:02X}, len={}",
                buf[0], len
            );
            Err(Error::FeatureReportError { reg_addr })
        }
        Err(e) => {
            trace!("get_feature_report error: {}", e);
            Err(Error::FeatureReportError { reg_addr })
        }
    }
}
