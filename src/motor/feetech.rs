// Feetech STS serial servo protocol
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Signed registers use sign-magnitude encoding with a register-specific sign bit.

use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

/// Default serial configuration for Feetech servos
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Direction bit of a relative move written to `GoalPosition` in step mode
const STEP_SIGN_BIT: u8 = 15;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// Register addresses for the STS series
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Register {
    // EEPROM area (persists across power cycles, needs Lock = 0 to write)
    MaxTorque = 16,    // 2 bytes, 0.1% of stall torque
    MagnetOffset = 31, // 2 bytes, sign bit 11

    // RAM area (volatile)
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalPosition = 42,    // 2 bytes, relative move in step mode
    GoalTime = 44,        // 2 bytes, open-loop output in PWM mode, sign bit 10
    GoalVelocity = 46,    // 2 bytes, sign bit 15
    TorqueLimit = 48,     // 2 bytes, 0.1% of stall torque
    Lock = 55,            // 1 byte: 0=unlocked, 1=locked
    PresentPosition = 56, // 2 bytes, read-only
    PresentVelocity = 58, // 2 bytes, read-only, sign bit 15
}

impl Register {
    /// Bit carrying the sign for sign-magnitude registers
    pub fn sign_bit(self) -> Option<u8> {
        match self {
            Register::MagnetOffset => Some(11),
            Register::GoalTime => Some(10),
            Register::GoalVelocity | Register::PresentVelocity => Some(15),
            _ => None,
        }
    }
}

/// Operating modes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Velocity = 1,
    Pwm = 2,
    Step = 3,
}

/// Error types for Feetech communication
#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },

    #[error("Register {register:?} is not signed")]
    UnsignedRegister { register: Register },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Byte stream carrying the servo protocol
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// Feetech servo bus - one serial line shared by every servo on it
pub struct FeetechBus {
    port: Box<dyn Transport>,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        debug!("Opening servo bus {} @ {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self::with_transport(port))
    }

    pub fn with_transport(port: impl Transport + 'static) -> Self {
        Self { port: Box::new(port) }
    }

    /// Checksum over everything after the header
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        trace!("-> {:02X?}", packet);
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one status packet and return its parameters
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FeetechError::Timeout { id: expected_id }
            } else {
                FeetechError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let [id, length] = id_length;

        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // error + params + checksum
        let mut remaining = vec![0u8; length as usize];
        self.port.read_exact(&mut remaining)?;
        Self::parse_status(id, length, &remaining)
    }

    /// Validate the body of a status packet (error byte, params, checksum)
    fn parse_status(id: u8, length: u8, body: &[u8]) -> Result<Vec<u8>> {
        let (payload, received) = body.split_at(body.len() - 1);

        let mut checksum_data = vec![id, length];
        checksum_data.extend_from_slice(payload);
        if Self::checksum(&checksum_data) != received[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        let status = payload[0];
        if status != 0 {
            return Err(FeetechError::ServoError { id, status });
        }

        Ok(payload[1..].to_vec())
    }

    fn transact(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = Self::build_packet(id, instruction, params);
        self.send_packet(&packet)?;
        self.read_response(id)
    }

    /// Ping a servo to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.transact(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to servo {}: reg={:?}, value={}", id, register, value);
        self.transact(id, Instruction::Write, &[register as u8, value])?;
        Ok(())
    }

    /// Write two bytes (little-endian) to a register
    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        trace!("Write u16 to servo {}: reg={:?}, value={}", id, register, value);
        let [lo, hi] = value.to_le_bytes();
        self.transact(id, Instruction::Write, &[register as u8, lo, hi])?;
        Ok(())
    }

    /// Write a signed value to a sign-magnitude register
    pub fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        let sign_bit = register
            .sign_bit()
            .ok_or(FeetechError::UnsignedRegister { register })?;
        self.write_u16(id, register, encode_sign_magnitude(value, sign_bit))
    }

    /// Read two bytes (little-endian) from a register
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let response = self.transact(id, Instruction::Read, &[register as u8, 2])?;
        match response.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            }),
        }
    }

    pub fn read_i16(&mut self, id: u8, register: Register) -> Result<i16> {
        let sign_bit = register
            .sign_bit()
            .ok_or(FeetechError::UnsignedRegister { register })?;
        let raw = self.read_u16(id, register)?;
        Ok(decode_sign_magnitude(raw, sign_bit))
    }

    // === High-level convenience methods ===

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Set operating mode (torque must be disabled)
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Relative move from the present position (step mode only)
    pub fn step(&mut self, id: u8, steps: i16) -> Result<()> {
        self.write_u16(id, Register::GoalPosition, encode_sign_magnitude(steps, STEP_SIGN_BIT))
    }

    pub fn set_velocity(&mut self, id: u8, velocity: i16) -> Result<()> {
        self.write_i16(id, Register::GoalVelocity, velocity)
    }

    /// Open-loop output in PWM mode, -1000..=1000
    pub fn set_pwm(&mut self, id: u8, output: i16) -> Result<()> {
        self.write_i16(id, Register::GoalTime, output.clamp(-1000, 1000))
    }

    /// Torque limit in 0.1% of stall torque
    pub fn set_torque_limit(&mut self, id: u8, limit: u16) -> Result<()> {
        self.write_u16(id, Register::TorqueLimit, limit.min(1000))
    }

    /// Magnet offset in steps (EEPROM, torque must be disabled)
    pub fn set_magnet_offset(&mut self, id: u8, steps: i16) -> Result<()> {
        self.write_i16(id, Register::MagnetOffset, steps)
    }

    pub fn get_position(&mut self, id: u8) -> Result<u16> {
        self.read_u16(id, Register::PresentPosition)
    }

    pub fn get_velocity(&mut self, id: u8) -> Result<i16> {
        self.read_i16(id, Register::PresentVelocity)
    }
}

/// Encode a signed value to sign-magnitude format
fn encode_sign_magnitude(value: i16, sign_bit: u8) -> u16 {
    let sign = 1u16 << sign_bit;
    let magnitude = value.unsigned_abs() & (sign - 1);
    if value < 0 { sign | magnitude } else { magnitude }
}

/// Decode sign-magnitude format to a signed value
fn decode_sign_magnitude(raw: u16, sign_bit: u8) -> i16 {
    let sign = 1u16 << sign_bit;
    let magnitude = (raw & (sign - 1)) as i16;
    if raw & sign != 0 { -magnitude } else { magnitude }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(FeetechBus::checksum(&data), 215);
    }

    #[test]
    fn test_velocity_sign_bit() {
        assert_eq!(encode_sign_magnitude(100, 15), 100);
        assert_eq!(encode_sign_magnitude(-100, 15), 0x8064);
        assert_eq!(decode_sign_magnitude(0x8001, 15), -1);
        assert_eq!(decode_sign_magnitude(100, 15), 100);
    }

    #[test]
    fn test_pwm_and_offset_sign_bits() {
        // PWM output carries its direction in bit 10
        assert_eq!(encode_sign_magnitude(-250, 10), 0x0400 | 250);
        assert_eq!(decode_sign_magnitude(0x0400 | 250, 10), -250);

        // Magnet offset carries its direction in bit 11
        assert_eq!(encode_sign_magnitude(-455, 11), 0x0800 | 455);
        assert_eq!(decode_sign_magnitude(455, 11), 455);
    }

    #[test]
    fn test_unsigned_registers_have_no_sign_bit() {
        assert_eq!(Register::GoalPosition.sign_bit(), None);
        assert_eq!(Register::PresentPosition.sign_bit(), None);
        assert_eq!(Register::GoalVelocity.sign_bit(), Some(15));
    }

    #[test]
    fn test_step_direction_bit() {
        assert_eq!(encode_sign_magnitude(-2438, STEP_SIGN_BIT), 0x8000 | 2438);
        assert_eq!(encode_sign_magnitude(21943, STEP_SIGN_BIT), 21943);
    }

    #[test]
    fn test_build_write_packet() {
        let packet = FeetechBus::build_packet(6, Instruction::Write, &[42, 0x00, 0x08]);
        assert_eq!(&packet[..5], &[0xFF, 0xFF, 6, 5, 0x03]);
        assert_eq!(&packet[5..8], &[42, 0x00, 0x08]);
        let expected = !(6u16 + 5 + 3 + 42 + 0x08) as u8;
        assert_eq!(packet[8], expected);
    }

    #[test]
    fn test_parse_status_position_read() {
        // Status for a 2-byte read of 2048 from servo 4
        let id = 4u8;
        let length = 4u8;
        let payload = [0u8, 0x00, 0x08];
        let mut sum_data = vec![id, length];
        sum_data.extend_from_slice(&payload);
        let mut body = payload.to_vec();
        body.push(FeetechBus::checksum(&sum_data));

        let params = FeetechBus::parse_status(id, length, &body).unwrap();
        assert_eq!(u16::from_le_bytes([params[0], params[1]]), 2048);
    }

    #[test]
    fn test_parse_status_rejects_bad_checksum_and_error_byte() {
        let body = [0u8, 0x00, 0x08, 0x00];
        assert!(matches!(
            FeetechBus::parse_status(4, 4, &body),
            Err(FeetechError::ChecksumMismatch { id: 4 })
        ));

        let payload = [0x20u8];
        let checksum = FeetechBus::checksum(&[4, 2, 0x20]);
        let body = [payload[0], checksum];
        assert!(matches!(
            FeetechBus::parse_status(4, 2, &body),
            Err(FeetechError::ServoError { id: 4, status: 0x20 })
        ));
    }
}
