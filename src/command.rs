//! Commands understood by the ROM loader
//!
//! Reading and burning eFuses only ever needs the register access commands, so
//! this is the small subset of the loader protocol required for that.

use std::{io::Write, time::Duration};

use bytemuck::{bytes_of, Pod, Zeroable};
use strum::Display;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
const SYNC_TIMEOUT: Duration = Duration::from_millis(100);

/// Payload of the SYNC command: two magic words followed by 32 bytes of `0x55`
const SYNC_FRAME: [u8; 36] = {
    let mut frame = [0x55; 36];
    frame[0] = 0x07;
    frame[1] = 0x07;
    frame[2] = 0x12;
    frame[3] = 0x20;
    frame
};

/// Types of commands that can be sent to a target device
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u8)]
pub enum CommandType {
    Unknown = 0,
    Sync = 0x08,
    WriteReg = 0x09,
    ReadReg = 0x0a,
}

impl CommandType {
    /// Return the default timeout for the [CommandType]
    pub fn timeout(&self) -> Duration {
        match self {
            CommandType::Sync => SYNC_TIMEOUT,
            _ => DEFAULT_TIMEOUT,
        }
    }
}

/// Available commands
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Command {
    /// Synchronize with the ROM loader
    Sync,
    /// Write a 32-bit memory mapped register, optionally masked
    WriteReg {
        address: u32,
        value: u32,
        mask: Option<u32>,
    },
    /// Read a 32-bit memory mapped register
    ReadReg { address: u32 },
}

impl Command {
    /// Return the type of the command
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Sync => CommandType::Sync,
            Command::WriteReg { .. } => CommandType::WriteReg,
            Command::ReadReg { .. } => CommandType::ReadReg,
        }
    }

    /// Return the timeout of the command
    pub fn timeout(&self) -> Duration {
        self.command_type().timeout()
    }

    /// Write the request packet (without SLIP framing) to `writer`
    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&[0, self.command_type() as u8])?;

        match *self {
            Command::Sync => {
                write_basic(writer, &SYNC_FRAME, 0)?;
            }
            Command::WriteReg {
                address,
                value,
                mask,
            } => {
                #[derive(Zeroable, Pod, Copy, Clone, Debug)]
                #[repr(C)]
                struct WriteRegParams {
                    addr: u32,
                    value: u32,
                    mask: u32,
                    delay_us: u32,
                }

                let params = WriteRegParams {
                    addr: address,
                    value,
                    mask: mask.unwrap_or(0xFFFF_FFFF),
                    delay_us: 0,
                };

                write_basic(writer, bytes_of(&params), 0)?;
            }
            Command::ReadReg { address } => {
                write_basic(writer, &address.to_le_bytes(), 0)?;
            }
        }

        Ok(())
    }
}

fn write_basic<W: Write>(mut writer: W, data: &[u8], checksum: u32) -> std::io::Result<()> {
    writer.write_all(&((data.len() as u16).to_le_bytes()))?;
    writer.write_all(&(checksum.to_le_bytes()))?;
    writer.write_all(data)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(command: Command) -> Vec<u8> {
        let mut buffer = Vec::new();
        command.write(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn read_reg_packet_layout() {
        let packet = encode(Command::ReadReg {
            address: 0x4000_1000,
        });

        assert_eq!(packet, [0, 0x0a, 4, 0, 0, 0, 0, 0, 0x00, 0x10, 0x00, 0x40]);
    }

    #[test]
    fn write_reg_defaults_to_full_mask() {
        let packet = encode(Command::WriteReg {
            address: 0x3FF5_A0FC,
            value: 0x5A5A,
            mask: None,
        });

        assert_eq!(&packet[..4], &[0, 0x09, 16, 0]);
        assert_eq!(&packet[8..12], &0x3FF5_A0FCu32.to_le_bytes());
        assert_eq!(&packet[12..16], &0x5A5Au32.to_le_bytes());
        assert_eq!(&packet[16..20], &[0xFF; 4]);
        assert_eq!(&packet[20..24], &[0; 4]);
    }

    #[test]
    fn sync_packet_carries_magic_preamble() {
        let packet = encode(Command::Sync);

        assert_eq!(packet.len(), 8 + 36);
        assert_eq!(&packet[8..12], &[0x07, 0x07, 0x12, 0x20]);
        assert!(packet[12..].iter().all(|b| *b == 0x55));
    }

    #[test]
    fn sync_uses_short_timeout() {
        assert!(Command::Sync.timeout() < Command::ReadReg { address: 0 }.timeout());
    }
}
