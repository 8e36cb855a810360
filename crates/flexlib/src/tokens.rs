//! Wire-name tables for every object type.
//!
//! Each table is a closed enum mapping the (lowercased) wire key to a
//! semantic field. A key missing from a table is not an error: the parsers
//! log it and move on, since newer firmware adds fields all the time.
//! Variants may list alias spellings after the primary wire name; the
//! primary name is what [`as_str`](SliceToken::as_str) returns and what
//! change events carry.

macro_rules! wire_tokens {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $variant:ident => $wire:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $variant ),+
        }

        impl $name {
            /// Look up a lowercased wire key.
            pub fn from_wire(key: &str) -> Option<Self> {
                match key {
                    $( $wire $(| $alias)* => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// The primary wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                }
            }
        }
    };
}

wire_tokens! {
    /// Object discriminator: the first word of a status payload.
    pub enum StatusObject {
        Slice => "slice",
        Display => "display",
        DaxIq => "daxiq" | "dax_iq",
        AudioStream => "audio_stream",
        MicAudioStream => "mic_audio_stream",
        TxAudioStream => "tx_audio_stream",
        OpusStream => "opus_stream",
        Stream => "stream",
        Transverter => "xvtr",
        Meter => "meter",
        Transmit => "transmit",
        Interlock => "interlock",
        Gps => "gps",
        Atu => "atu",
        Wan => "wan",
        Waveform => "waveform",
        Profile => "profile",
        Radio => "radio",
        Client => "client",
    }
}

wire_tokens! {
    /// Second word of a `display` status.
    pub enum DisplayKind {
        Panadapter => "pan",
        Waterfall => "waterfall",
    }
}

wire_tokens! {
    /// `type=` of a `stream 0x..` status.
    pub enum StreamType {
        DaxRx => "dax_rx",
        DaxIq => "dax_iq",
        DaxMic => "dax_mic",
        DaxTx => "dax_tx",
        RemoteAudioRx => "remote_audio_rx",
    }
}

wire_tokens! {
    /// `slice <n> ...`
    pub enum SliceToken {
        InUse => "in_use",
        Frequency => "rf_frequency",
        Mode => "mode",
        Panadapter => "pan",
        FilterLow => "filter_lo",
        FilterHigh => "filter_hi",
        Active => "active",
        Transmit => "tx",
        DaxChannel => "dax",
        IndexLetter => "index_letter",
        ClientHandle => "client_handle",
        RxAntenna => "rxant",
        TxAntenna => "txant",
        AgcMode => "agc_mode",
        AgcThreshold => "agc_threshold",
        AudioLevel => "audio_level" | "audio_gain",
        AudioPan => "audio_pan",
        AudioMute => "audio_mute",
        RitOn => "rit_on",
        RitFrequency => "rit_freq",
        XitOn => "xit_on",
        XitFrequency => "xit_freq",
        Step => "step",
        Lock => "lock",
        NoiseBlanker => "nb",
        NoiseBlankerLevel => "nb_level",
        NoiseReduction => "nr",
        NoiseReductionLevel => "nr_level",
        Squelch => "squelch",
        SquelchLevel => "squelch_level",
        SampleRate => "sample_rate",
    }
}

wire_tokens! {
    /// `transmit ...`
    pub enum TransmitToken {
        Frequency => "freq",
        RfPower => "rfpower",
        TunePower => "tunepower",
        Tune => "tune",
        AmCarrierLevel => "am_carrier_level",
        MicSelection => "mic_selection",
        MicLevel => "mic_level",
        MicBoost => "mic_boost",
        MicBias => "mic_bias",
        MicAcc => "mic_acc",
        CompanderOn => "compander",
        CompanderLevel => "compander_level",
        SpeechProcessorOn => "speech_processor_enable",
        SpeechProcessorLevel => "speech_processor_level",
        VoxOn => "vox_enable",
        VoxLevel => "vox_level",
        VoxDelay => "vox_delay",
        FilterLow => "lo" | "tx_filter_low",
        FilterHigh => "hi" | "tx_filter_high",
        CwPitch => "pitch",
        CwSpeed => "speed",
        CwIambic => "iambic",
        CwIambicMode => "iambic_mode",
        CwSwapPaddles => "swap_paddles",
        CwBreakIn => "break_in",
        CwBreakInDelay => "break_in_delay",
        CwSidetone => "sidetone",
        MonitorGainCw => "mon_gain_cw",
        MonitorGainSb => "mon_gain_sb",
        SbMonitor => "sb_monitor",
        Dax => "dax",
        HwAlcEnabled => "hwalc_enabled",
        Inhibit => "inhibit",
        MaxPowerLevel => "max_power_level",
        ShowTxInWaterfall => "show_tx_in_waterfall",
    }
}

wire_tokens! {
    /// `interlock ...`
    pub enum InterlockToken {
        State => "state",
        Reason => "reason",
        Source => "source",
        TxClientHandle => "tx_client_handle",
        TxAllowed => "tx_allowed",
        Timeout => "timeout",
        AccTxReqEnable => "acc_txreq_enable",
        RcaTxReqEnable => "rca_txreq_enable",
        AccTxEnabled => "acc_tx_enabled",
        Tx1Enabled => "tx1_enabled",
        Tx2Enabled => "tx2_enabled",
        Tx3Enabled => "tx3_enabled",
        TxDelay => "tx_delay",
        Amplifier => "amplifier",
    }
}

wire_tokens! {
    /// `gps ...` (pairs delimited by `#`)
    pub enum GpsToken {
        Latitude => "lat",
        Longitude => "lon",
        Grid => "grid",
        Altitude => "altitude",
        Tracked => "tracked",
        Visible => "visible",
        Speed => "speed",
        FrequencyError => "freq_error",
        Status => "status",
        Time => "time",
        Track => "track",
    }
}

wire_tokens! {
    /// `atu ...`
    pub enum AtuToken {
        Status => "status",
        Enabled => "atu_enabled",
        MemoriesEnabled => "memories_enabled",
        UsingMemory => "using_mem",
    }
}

wire_tokens! {
    /// `wan ...`
    pub enum WanToken {
        ServerConnected => "server_connected",
        RadioAuthenticated => "radio_authenticated",
    }
}

wire_tokens! {
    /// `waveform ...`
    pub enum WaveformToken {
        InstalledList => "installed_list",
    }
}

wire_tokens! {
    /// First level of a `profile` status: which profile set.
    pub enum ProfileSetToken {
        Global => "global",
        Mic => "mic",
        Transmit => "tx",
    }
}

wire_tokens! {
    /// Second level of a `profile` status: list or current selection.
    pub enum ProfileItemToken {
        List => "list",
        Current => "current",
    }
}

wire_tokens! {
    /// `radio ...` status and the `info` reply.
    pub enum RadioToken {
        Slices => "slices",
        Panadapters => "panadapters",
        LineoutGain => "lineout_gain",
        LineoutMute => "lineout_mute",
        HeadphoneGain => "headphone_gain",
        HeadphoneMute => "headphone_mute",
        RemoteOnEnabled => "remote_on_enabled",
        PllDone => "pll_done",
        FrequencyErrorPpb => "freq_error_ppb",
        CalibrationFrequency => "cal_freq",
        TnfEnabled => "tnf_enabled",
        Nickname => "nickname" | "name",
        Callsign => "callsign",
        BinauralRx => "binaural_rx",
        FullDuplexEnabled => "full_duplex_enabled",
        MuteLocalAudioWhenRemote => "mute_local_audio_when_remote",
        DaxIqCapacity => "daxiq_capacity",
        DaxIqAvailable => "daxiq_available",
        Model => "model",
        ChassisSerial => "chassis_serial",
        SoftwareVersion => "software_ver",
        AtuPresent => "atu_present",
        GpsPresent => "gps",
        NumScu => "num_scu",
        NumSlice => "num_slice",
        NumTx => "num_tx",
        Mac => "mac",
        Ip => "ip",
        Region => "region",
        Options => "options",
    }
}

wire_tokens! {
    /// `client 0x<handle> connected ...`
    pub enum ClientToken {
        ClientId => "client_id",
        Program => "program",
        Station => "station",
        LocalPtt => "local_ptt",
    }
}

wire_tokens! {
    /// `display pan 0x<id> ...`
    pub enum PanadapterToken {
        Center => "center",
        Bandwidth => "bandwidth",
        MinDbm => "min_dbm",
        MaxDbm => "max_dbm",
        Fps => "fps",
        Average => "average",
        WeightedAverage => "weighted_average",
        RfGain => "rfgain",
        RxAntenna => "rxant",
        Wide => "wide",
        LoopA => "loopa",
        LoopB => "loopb",
        Band => "band",
        DaxIqChannel => "daxiq_channel" | "daxiq",
        Waterfall => "waterfall",
        XPixels => "x_pixels",
        YPixels => "y_pixels",
        ClientHandle => "client_handle",
        WidebandNoiseBlanker => "wnb",
        WidebandNoiseBlankerLevel => "wnb_level",
        Preamp => "pre",
    }
}

wire_tokens! {
    /// `display waterfall 0x<id> ...`
    pub enum WaterfallToken {
        Panadapter => "panadapter",
        Center => "center",
        Bandwidth => "bandwidth",
        LineDuration => "line_duration",
        ColorGain => "color_gain",
        AutoBlack => "auto_black",
        BlackLevel => "black_level",
        GradientIndex => "gradient_index",
        XPixels => "x_pixels",
        ClientHandle => "client_handle",
        Band => "band",
        RxAntenna => "rxant",
        DaxIqChannel => "daxiq_channel" | "daxiq",
    }
}

wire_tokens! {
    /// `daxiq 0x<id> ...` and `stream 0x<id> type=dax_iq ...`
    pub enum IqStreamToken {
        Available => "available",
        Capacity => "capacity",
        Channel => "daxiq" | "daxiq_channel",
        InUse => "in_use",
        Ip => "ip",
        Panadapter => "pan",
        Port => "port",
        Rate => "rate" | "daxiq_rate",
        Streaming => "streaming",
        ClientHandle => "client_handle",
        Type => "type",
    }
}

wire_tokens! {
    /// `audio_stream 0x<id> ...` and `stream 0x<id> type=dax_rx ...`
    pub enum AudioStreamToken {
        Channel => "dax" | "dax_channel",
        Slice => "slice",
        Ip => "ip",
        Port => "port",
        InUse => "in_use",
        DaxClients => "dax_clients",
        ClientHandle => "client_handle",
        Type => "type",
    }
}

wire_tokens! {
    /// `mic_audio_stream 0x<id> ...` and `stream 0x<id> type=dax_mic ...`
    pub enum MicAudioStreamToken {
        InUse => "in_use",
        Ip => "ip",
        Port => "port",
        ClientHandle => "client_handle",
        Type => "type",
    }
}

wire_tokens! {
    /// `tx_audio_stream 0x<id> ...` and `stream 0x<id> type=dax_tx ...`
    pub enum TxAudioStreamToken {
        InUse => "in_use",
        Ip => "ip",
        Port => "port",
        DaxTx => "dax_tx" | "transmit",
        ClientHandle => "client_handle",
        Type => "type",
    }
}

wire_tokens! {
    /// `opus_stream 0x<id> ...` and `stream 0x<id> type=remote_audio_rx ...`
    pub enum OpusStreamToken {
        InUse => "in_use",
        Ip => "ip",
        Port => "port",
        RxOn => "rx_on",
        TxOn => "tx_on",
        RxStopped => "rx_stopped",
        Compression => "compression",
        ClientHandle => "client_handle",
        Type => "type",
    }
}

wire_tokens! {
    /// `xvtr <n> ...`
    pub enum TransverterToken {
        InUse => "in_use",
        Name => "name",
        RfFrequency => "rf_freq",
        IfFrequency => "if_freq",
        LoError => "lo_error",
        MaxPower => "max_power",
        RxGain => "rx_gain",
        RxOnly => "rx_only",
        Order => "order",
        IsValid => "is_valid",
        Preferred => "preferred",
        TwoMeterInt => "two_meter_int",
    }
}

wire_tokens! {
    /// `meter <id>.<key>=...` entries.
    pub enum MeterToken {
        Source => "src",
        SourceIndex => "num",
        Name => "nam",
        Low => "low",
        High => "hi",
        Description => "desc",
        Units => "unit",
        Fps => "fps",
    }
}

wire_tokens! {
    /// Discovery broadcast fields.
    pub enum DiscoveryToken {
        Serial => "serial",
        Model => "model",
        Nickname => "nickname",
        Callsign => "callsign",
        Ip => "ip",
        Port => "port",
        Version => "version",
        Status => "status",
        InUseIp => "inuse_ip",
        InUseHost => "inuse_host",
        MaxLicensedVersion => "max_licensed_version",
        LicensedClients => "licensed_clients",
        AvailableClients => "available_clients",
        AvailableSlices => "available_slices",
        AvailablePanadapters => "available_panadapters",
        MaxSlices => "max_slices",
        MaxPanadapters => "max_panadapters",
        RadioLicenseId => "radio_license_id",
        RequiresAdditionalLicense => "requires_additional_license",
        WanConnected => "wan_connected",
        FpcMac => "fpc_mac",
        DiscoveryProtocolVersion => "discovery_protocol_version",
        TurfRegion => "turf_region",
        ExternalPortLink => "external_port_link",
        MinSoftwareVersion => "min_software_version",
        GuiClientHandles => "gui_client_handles",
        GuiClientPrograms => "gui_client_programs",
        GuiClientStations => "gui_client_stations",
        GuiClientHosts => "gui_client_hosts",
        GuiClientIps => "gui_client_ips",
    }
}

wire_tokens! {
    /// Entries of a SmartLink `radio list`.
    pub enum WanRadioToken {
        Serial => "serial",
        Model => "model",
        RadioName => "radio_name" | "nickname",
        Callsign => "callsign",
        Status => "status",
        LastSeen => "last_seen",
        Version => "version",
        PublicIp => "public_ip",
        PublicTlsPort => "public_tls_port",
        PublicUdpPort => "public_udp_port",
        UpnpTlsPort => "public_upnp_tls_port" | "upnp_tls_port",
        UpnpUdpPort => "public_upnp_udp_port" | "upnp_udp_port",
        UpnpSupported => "upnp_supported",
        RequiresHolepunch => "requires_holepunch",
        NegotiatedHolepunchPort => "negotiated_holepunch_port",
        MaxLicensedVersion => "max_licensed_version",
        RadioLicenseId => "radio_license_id",
        InUseIp => "inuse_ip",
        InUseHost => "inuse_host",
        GuiClientHandles => "gui_client_handles",
        GuiClientPrograms => "gui_client_programs",
        GuiClientStations => "gui_client_stations",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_resolve() {
        assert_eq!(SliceToken::from_wire("rf_frequency"), Some(SliceToken::Frequency));
        assert_eq!(
            TransmitToken::from_wire("iambic_mode"),
            Some(TransmitToken::CwIambicMode)
        );
        assert_eq!(IqStreamToken::from_wire("ip"), Some(IqStreamToken::Ip));
    }

    #[test]
    fn aliases_resolve_to_primary() {
        assert_eq!(IqStreamToken::from_wire("daxiq_rate"), Some(IqStreamToken::Rate));
        assert_eq!(IqStreamToken::Rate.as_str(), "rate");
        assert_eq!(
            AudioStreamToken::from_wire("dax_channel"),
            Some(AudioStreamToken::Channel)
        );
        assert_eq!(TransmitToken::from_wire("lo"), Some(TransmitToken::FilterLow));
    }

    #[test]
    fn unknown_keys_are_none() {
        assert_eq!(SliceToken::from_wire("no_such_field"), None);
        assert_eq!(GpsToken::from_wire(""), None);
        // Lookup is case-sensitive; the codec lowercases keys first.
        assert_eq!(SliceToken::from_wire("RF_frequency"), None);
    }

    #[test]
    fn profile_levels_are_distinct_tables() {
        assert_eq!(ProfileSetToken::from_wire("tx"), Some(ProfileSetToken::Transmit));
        assert_eq!(ProfileItemToken::from_wire("current"), Some(ProfileItemToken::Current));
        assert_eq!(ProfileSetToken::from_wire("list"), None);
    }

    #[test]
    fn status_discriminators() {
        assert_eq!(StatusObject::from_wire("xvtr"), Some(StatusObject::Transverter));
        assert_eq!(StatusObject::from_wire("dax_iq"), Some(StatusObject::DaxIq));
        assert_eq!(StreamType::from_wire("remote_audio_rx"), Some(StreamType::RemoteAudioRx));
        assert_eq!(DisplayKind::from_wire("pan"), Some(DisplayKind::Panadapter));
    }
}
