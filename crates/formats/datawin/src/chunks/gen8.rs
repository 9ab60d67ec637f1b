use crate::address::Field;
use crate::context::{ReadCtx, Resource, WriteCtx};
use crate::error::Result;
use crate::string_table::StringRef;
use crate::version::{BytecodeVersion, FormatVersion};

/// GEN8 chunk: general game information.
#[derive(Debug, Clone, PartialEq)]
pub struct Gen8 {
    pub is_debug_disabled: u8,
    pub bytecode_version: BytecodeVersion,
    pub unknown: u16,
    pub filename: StringRef,
    pub config: StringRef,
    pub last_obj: u32,
    pub last_tile: u32,
    pub game_id: u32,
    pub guid: [u8; 16],
    pub name: StringRef,
    /// IDE version that built the game. 2.3+ games usually still say 2.0 here.
    pub version: FormatVersion,
    pub default_window_width: u32,
    pub default_window_height: u32,
    pub info: u32,
    pub license_crc32: u32,
    pub license_md5: [u8; 16],
    pub timestamp: u64,
    pub display_name: StringRef,
    pub active_targets: u64,
    pub function_classifications: u64,
    pub steam_app_id: i32,
    pub debugger_port: u32,
    /// Room IDs in play order.
    pub room_order: Vec<u32>,
    /// Fields newer runtimes append after the room order, kept verbatim.
    pub tail: Vec<u8>,
}

impl Gen8 {
    /// A header for a new game, with every name field pointing at `name`.
    pub fn new(name: StringRef, bytecode_version: BytecodeVersion, version: FormatVersion) -> Self {
        Self {
            is_debug_disabled: 0,
            bytecode_version,
            unknown: 0,
            filename: name,
            config: name,
            last_obj: 0,
            last_tile: 0,
            game_id: 0,
            guid: [0; 16],
            name,
            version,
            default_window_width: 1024,
            default_window_height: 768,
            info: 0,
            license_crc32: 0,
            license_md5: [0; 16],
            timestamp: 0,
            display_name: name,
            active_targets: 0,
            function_classifications: 0,
            steam_app_id: 0,
            debugger_port: 0,
            room_order: Vec::new(),
            tail: Vec::new(),
        }
    }
}

impl Resource for Gen8 {
    fn unserialize(r: &mut ReadCtx<'_, '_>) -> Result<Self> {
        let is_debug_disabled = r.read_u8()?;
        let bytecode_version = BytecodeVersion(r.read_u8()?);
        let unknown = r.read_u16()?;
        let filename = r.read_string(Field::Filename)?;
        let config = r.read_string(Field::Config)?;
        let last_obj = r.read_u32()?;
        let last_tile = r.read_u32()?;
        let game_id = r.read_u32()?;
        let guid = r.read_array()?;
        let name = r.read_string(Field::Name)?;
        let version = FormatVersion {
            major: r.read_u32()?,
            minor: r.read_u32()?,
            release: r.read_u32()?,
            build: r.read_u32()?,
        };
        let default_window_width = r.read_u32()?;
        let default_window_height = r.read_u32()?;
        let info = r.read_u32()?;
        let license_crc32 = r.read_u32()?;
        let license_md5 = r.read_array()?;
        let timestamp = r.read_u64()?;
        let display_name = r.read_string(Field::DisplayName)?;
        let active_targets = r.read_u64()?;
        let function_classifications = r.read_u64()?;
        let steam_app_id = r.read_i32()?;
        let debugger_port = r.read_u32()?;

        let room_count = r.read_u32()?;
        let mut room_order = Vec::with_capacity((room_count as usize).min(r.remaining() / 4));
        for _ in 0..room_count {
            room_order.push(r.read_u32()?);
        }

        let rest = r.remaining();
        let tail = r.read_bytes(rest)?.to_vec();

        Ok(Self {
            is_debug_disabled,
            bytecode_version,
            unknown,
            filename,
            config,
            last_obj,
            last_tile,
            game_id,
            guid,
            name,
            version,
            default_window_width,
            default_window_height,
            info,
            license_crc32,
            license_md5,
            timestamp,
            display_name,
            active_targets,
            function_classifications,
            steam_app_id,
            debugger_port,
            room_order,
            tail,
        })
    }

    fn serialize(&self, w: &mut WriteCtx) -> Result<()> {
        w.write_u8(self.is_debug_disabled);
        w.write_u8(self.bytecode_version.0);
        w.write_u16(self.unknown);
        w.write_string(self.filename);
        w.write_string(self.config);
        w.write_u32(self.last_obj);
        w.write_u32(self.last_tile);
        w.write_u32(self.game_id);
        w.write_bytes(&self.guid);
        w.write_string(self.name);
        w.write_u32(self.version.major);
        w.write_u32(self.version.minor);
        w.write_u32(self.version.release);
        w.write_u32(self.version.build);
        w.write_u32(self.default_window_width);
        w.write_u32(self.default_window_height);
        w.write_u32(self.info);
        w.write_u32(self.license_crc32);
        w.write_bytes(&self.license_md5);
        w.write_u64(self.timestamp);
        w.write_string(self.display_name);
        w.write_u64(self.active_targets);
        w.write_u64(self.function_classifications);
        w.write_i32(self.steam_app_id);
        w.write_u32(self.debugger_port);
        w.write_u32(self.room_order.len() as u32);
        for &room in &self.room_order {
            w.write_u32(room);
        }
        w.write_bytes(&self.tail);
        Ok(())
    }
}
